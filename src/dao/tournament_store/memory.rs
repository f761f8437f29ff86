//! In-process store used for local runs and tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{ClockEntity, TallyEntity, VoteEntity, WinnerEntity, WinnerInsert},
    storage::StorageResult,
    tournament_store::TournamentStore,
};

/// Store keeping every record in process memory; cloning shares the same data.
#[derive(Clone, Default)]
pub struct MemoryTournamentStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    votes: DashMap<(String, Uuid), VoteEntity>,
    winners: DashMap<String, WinnerEntity>,
    clock: RwLock<Option<ClockEntity>>,
}

impl MemoryTournamentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of winner records stored.
    pub fn winner_count(&self) -> usize {
        self.inner.winners.len()
    }
}

impl TournamentStore for MemoryTournamentStore {
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner
                .votes
                .insert((vote.phase_key.clone(), vote.voter_id), vote);
            Ok(())
        })
    }

    fn tally_votes(&self, phase_key: String) -> BoxFuture<'static, StorageResult<TallyEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut tally = TallyEntity::default();
            inner
                .votes
                .iter()
                .filter(|entry| entry.key().0 == phase_key)
                .for_each(|entry| tally.add(entry.value().color));
            Ok(tally)
        })
    }

    fn find_winner(
        &self,
        phase_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WinnerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Ok(inner
                .winners
                .get(&phase_key)
                .map(|entry| entry.value().clone()))
        })
    }

    fn insert_winner(&self, winner: WinnerEntity) -> BoxFuture<'static, StorageResult<WinnerInsert>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let outcome = match inner.winners.entry(winner.phase_key.clone()) {
                Entry::Occupied(existing) => WinnerInsert::Existing(existing.get().clone()),
                Entry::Vacant(slot) => {
                    slot.insert(winner.clone());
                    WinnerInsert::Inserted(winner)
                }
            };
            Ok(outcome)
        })
    }

    fn load_clock(&self) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { Ok(inner.clock.read().await.clone()) })
    }

    fn init_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<ClockEntity>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.clock.write().await;
            Ok(guard.get_or_insert(clock).clone())
        })
    }

    fn replace_clock(
        &self,
        expected_version: u64,
        clock: ClockEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let mut guard = inner.clock.write().await;
            let current = guard
                .as_ref()
                .is_some_and(|stored| stored.version == expected_version);
            if current {
                *guard = Some(clock);
            }
            Ok(current)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
