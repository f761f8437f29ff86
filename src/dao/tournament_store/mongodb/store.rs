use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoClockDocument, MongoVoteDocument, MongoWinnerDocument, clock_filter, color_filter,
        key_filter, vote_doc_id,
    },
};
use crate::{
    dao::{
        models::{CLOCK_ROW_ID, ClockEntity, TallyEntity, VoteEntity, WinnerEntity, WinnerInsert},
        storage::StorageResult,
        tournament_store::TournamentStore,
    },
    state::bracket::Color,
};

const VOTE_COLLECTION_NAME: &str = "votes";
const WINNER_COLLECTION_NAME: &str = "winners";
const CLOCK_COLLECTION_NAME: &str = "clock";
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoTournamentStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoTournamentStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let votes = self.votes().await;
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"phase_key": 1, "color": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("vote_phase_color_idx".to_owned()))
                    .build(),
            )
            .build();

        votes
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: VOTE_COLLECTION_NAME,
                index: "phase_key,color",
                source,
            })?;

        // Winners and the clock row are keyed by `_id`, which is already unique.
        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn votes(&self) -> Collection<MongoVoteDocument> {
        self.database()
            .await
            .collection::<MongoVoteDocument>(VOTE_COLLECTION_NAME)
    }

    async fn winners(&self) -> Collection<MongoWinnerDocument> {
        self.database()
            .await
            .collection::<MongoWinnerDocument>(WINNER_COLLECTION_NAME)
    }

    async fn clock(&self) -> Collection<MongoClockDocument> {
        self.database()
            .await
            .collection::<MongoClockDocument>(CLOCK_COLLECTION_NAME)
    }

    async fn upsert_vote(&self, vote: VoteEntity) -> MongoResult<()> {
        let phase_key = vote.phase_key.clone();
        let id = vote_doc_id(&phase_key, vote.voter_id);
        let document: MongoVoteDocument = vote.into();
        self.votes()
            .await
            .replace_one(key_filter(&id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveVote { phase_key, source })?;
        Ok(())
    }

    async fn tally_votes(&self, phase_key: String) -> MongoResult<TallyEntity> {
        let votes = self.votes().await;
        let count = |color| {
            let votes = votes.clone();
            let filter = color_filter(&phase_key, color);
            async move { votes.count_documents(filter).await }
        };

        let (red, blue) = futures::try_join!(count(Color::Red), count(Color::Blue))
            .map_err(|source| MongoDaoError::CountVotes {
                phase_key: phase_key.clone(),
                source,
            })?;
        Ok(TallyEntity { red, blue })
    }

    async fn find_winner(&self, phase_key: String) -> MongoResult<Option<WinnerEntity>> {
        let document = self
            .winners()
            .await
            .find_one(key_filter(&phase_key))
            .await
            .map_err(|source| MongoDaoError::LoadWinner { phase_key, source })?;
        Ok(document.map(Into::into))
    }

    async fn insert_winner(&self, winner: WinnerEntity) -> MongoResult<WinnerInsert> {
        let phase_key = winner.phase_key.clone();
        let document: MongoWinnerDocument = winner.clone().into();
        match self.winners().await.insert_one(&document).await {
            Ok(_) => Ok(WinnerInsert::Inserted(winner)),
            Err(err) if is_duplicate_key(&err) => {
                let existing = self
                    .find_winner(phase_key.clone())
                    .await?
                    .ok_or(MongoDaoError::MissingWinner { phase_key })?;
                Ok(WinnerInsert::Existing(existing))
            }
            Err(source) => Err(MongoDaoError::SaveWinner { phase_key, source }),
        }
    }

    async fn load_clock(&self) -> MongoResult<Option<ClockEntity>> {
        let document = self
            .clock()
            .await
            .find_one(key_filter(CLOCK_ROW_ID))
            .await
            .map_err(|source| MongoDaoError::LoadClock { source })?;
        Ok(document.map(Into::into))
    }

    async fn init_clock(&self, clock: ClockEntity) -> MongoResult<ClockEntity> {
        let document: MongoClockDocument = clock.clone().into();
        match self.clock().await.insert_one(&document).await {
            Ok(_) => Ok(clock),
            Err(err) if is_duplicate_key(&err) => {
                self.load_clock().await?.ok_or(MongoDaoError::MissingClock)
            }
            Err(source) => Err(MongoDaoError::SaveClock { source }),
        }
    }

    async fn replace_clock(&self, expected_version: u64, clock: ClockEntity) -> MongoResult<bool> {
        let document: MongoClockDocument = clock.into();
        let result = self
            .clock()
            .await
            .replace_one(clock_filter(expected_version), &document)
            .await
            .map_err(|source| MongoDaoError::SaveClock { source })?;
        Ok(result.matched_count == 1)
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY_CODE
    )
}

impl TournamentStore for MongoTournamentStore {
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_vote(vote).await.map_err(Into::into) })
    }

    fn tally_votes(&self, phase_key: String) -> BoxFuture<'static, StorageResult<TallyEntity>> {
        let store = self.clone();
        Box::pin(async move { store.tally_votes(phase_key).await.map_err(Into::into) })
    }

    fn find_winner(
        &self,
        phase_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WinnerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_winner(phase_key).await.map_err(Into::into) })
    }

    fn insert_winner(&self, winner: WinnerEntity) -> BoxFuture<'static, StorageResult<WinnerInsert>> {
        let store = self.clone();
        Box::pin(async move { store.insert_winner(winner).await.map_err(Into::into) })
    }

    fn load_clock(&self) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_clock().await.map_err(Into::into) })
    }

    fn init_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<ClockEntity>> {
        let store = self.clone();
        Box::pin(async move { store.init_clock(clock).await.map_err(Into::into) })
    }

    fn replace_clock(
        &self,
        expected_version: u64,
        clock: ClockEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .replace_clock(expected_version, clock)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
