use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    models::{CLOCK_ROW_ID, ClockEntity, TallyEntity, VoteEntity, WinnerEntity, WinnerInsert},
    storage::StorageResult,
    tournament_store::TournamentStore,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchClockDocument, CouchVoteColor, CouchVoteDocument,
        CouchWinnerDocument, END_SUFFIX, vote_prefix, winner_doc_id,
    },
};

const VOTE_WRITE_ATTEMPTS: u32 = 3;

/// Outcome of a document PUT.
enum PutOutcome {
    Written,
    Conflict,
}

#[derive(Clone)]
pub struct CouchTournamentStore {
    client: Client,
    database_url: Arc<Url>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchTournamentStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = config.base_url.trim_end_matches('/');
        let invalid = || CouchDaoError::InvalidBaseUrl {
            url: base_url.to_owned(),
        };
        let mut database_url = Url::parse(base_url).map_err(|_| invalid())?;
        database_url
            .path_segments_mut()
            .map_err(|_| invalid())?
            .pop_if_empty()
            .push(&config.database);

        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url: Arc::new(database_url),
            database: Arc::<str>::from(config.database),
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, doc_id: &str) -> CouchResult<reqwest::RequestBuilder> {
        let mut url = Url::clone(&self.database_url);
        url.path_segments_mut()
            .map_err(|_| CouchDaoError::InvalidBaseUrl {
                url: self.database_url.to_string(),
            })?
            .push(doc_id);
        Ok(self.with_auth(self.client.request(method, url)))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = Url::clone(&self.database_url);

        let response = self
            .with_auth(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means a concurrent creator won the race.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)?
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value = response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|source| CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    })?;
                from_value(value)
                    .map(Some)
                    .map_err(|source| CouchDaoError::DeserializeValue {
                        path: doc_id.to_string(),
                        source,
                    })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)?
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Written),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let encode = |key: String| {
            serde_json::to_string(&key).map_err(|source| CouchDaoError::DeserializeValue {
                path: ALL_DOCS.to_string(),
                source,
            })
        };
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", encode(prefix.to_owned())?),
            ("endkey", encode(format!("{prefix}{END_SUFFIX}"))?),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)?
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| {
                from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: ALL_DOCS.to_string(),
                    source,
                })
            })
            .collect()
    }

    async fn upsert_vote(&self, vote: VoteEntity) -> CouchResult<()> {
        let mut doc = CouchVoteDocument::from(vote);
        for _ in 0..VOTE_WRITE_ATTEMPTS {
            doc.rev = self
                .get_document::<CouchVoteDocument>(&doc.id)
                .await?
                .and_then(|existing| existing.rev);
            if let PutOutcome::Written = self.put_document(&doc.id, &doc).await? {
                return Ok(());
            }
        }
        Err(CouchDaoError::PersistentConflict {
            path: doc.id,
            attempts: VOTE_WRITE_ATTEMPTS,
        })
    }

    async fn tally_votes(&self, phase_key: &str) -> CouchResult<TallyEntity> {
        let votes = self
            .list_documents::<CouchVoteColor>(&vote_prefix(phase_key))
            .await?;
        let mut tally = TallyEntity::default();
        votes.into_iter().for_each(|vote| tally.add(vote.color));
        Ok(tally)
    }

    async fn find_winner(&self, phase_key: &str) -> CouchResult<Option<WinnerEntity>> {
        let doc = self
            .get_document::<CouchWinnerDocument>(&winner_doc_id(phase_key))
            .await?;
        Ok(doc.map(Into::into))
    }

    async fn insert_winner(&self, winner: WinnerEntity) -> CouchResult<WinnerInsert> {
        let doc = CouchWinnerDocument::from(winner.clone());
        match self.put_document(&doc.id, &doc).await? {
            PutOutcome::Written => Ok(WinnerInsert::Inserted(winner)),
            PutOutcome::Conflict => {
                let existing = self
                    .find_winner(&winner.phase_key)
                    .await?
                    .ok_or(CouchDaoError::MissingDocument { path: doc.id })?;
                Ok(WinnerInsert::Existing(existing))
            }
        }
    }

    async fn load_clock_document(&self) -> CouchResult<Option<CouchClockDocument>> {
        self.get_document::<CouchClockDocument>(CLOCK_ROW_ID).await
    }

    async fn init_clock(&self, clock: ClockEntity) -> CouchResult<ClockEntity> {
        let doc = CouchClockDocument::from_entity(clock.clone(), None);
        match self.put_document(CLOCK_ROW_ID, &doc).await? {
            PutOutcome::Written => Ok(clock),
            PutOutcome::Conflict => self
                .load_clock_document()
                .await?
                .map(Into::into)
                .ok_or(CouchDaoError::MissingDocument {
                    path: CLOCK_ROW_ID.to_owned(),
                }),
        }
    }

    async fn replace_clock(&self, expected_version: u64, clock: ClockEntity) -> CouchResult<bool> {
        let Some(current) = self.load_clock_document().await? else {
            return Ok(false);
        };
        if current.version != expected_version {
            return Ok(false);
        }
        // The revision guards the window between the read above and this write.
        let doc = CouchClockDocument::from_entity(clock, current.rev);
        Ok(matches!(
            self.put_document(CLOCK_ROW_ID, &doc).await?,
            PutOutcome::Written
        ))
    }

    async fn ping(&self) -> CouchResult<()> {
        let url = Url::clone(&self.database_url);
        let response = self
            .with_auth(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: url.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: url.to_string(),
                status: response.status(),
            })
        }
    }
}

impl TournamentStore for CouchTournamentStore {
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_vote(vote).await.map_err(Into::into) })
    }

    fn tally_votes(&self, phase_key: String) -> BoxFuture<'static, StorageResult<TallyEntity>> {
        let store = self.clone();
        Box::pin(async move { store.tally_votes(&phase_key).await.map_err(Into::into) })
    }

    fn find_winner(
        &self,
        phase_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WinnerEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_winner(&phase_key).await.map_err(Into::into) })
    }

    fn insert_winner(&self, winner: WinnerEntity) -> BoxFuture<'static, StorageResult<WinnerInsert>> {
        let store = self.clone();
        Box::pin(async move { store.insert_winner(winner).await.map_err(Into::into) })
    }

    fn load_clock(&self) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store.load_clock_document().await?;
            Ok(doc.map(Into::into))
        })
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
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
