#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{ClockEntity, TallyEntity, VoteEntity, WinnerEntity, WinnerInsert};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the durable store backing votes, winners and the clock row.
///
/// Backends must make `insert_winner` first-writer-wins and `replace_clock` a
/// compare-and-set; request handlers rely on nothing else for coordination.
pub trait TournamentStore: Send + Sync {
    /// Insert or overwrite the vote keyed by `(phase_key, voter_id)`.
    fn upsert_vote(&self, vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Count votes per color for one phase key.
    fn tally_votes(&self, phase_key: String) -> BoxFuture<'static, StorageResult<TallyEntity>>;
    /// Fetch the decided winner for a phase key, if any.
    fn find_winner(
        &self,
        phase_key: String,
    ) -> BoxFuture<'static, StorageResult<Option<WinnerEntity>>>;
    /// Insert a winner unless one is already stored; a duplicate is not an error.
    fn insert_winner(&self, winner: WinnerEntity) -> BoxFuture<'static, StorageResult<WinnerInsert>>;
    /// Load the singleton clock row.
    fn load_clock(&self) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>>;
    /// Write `clock` if no row exists yet, returning whichever row is stored afterwards.
    fn init_clock(&self, clock: ClockEntity) -> BoxFuture<'static, StorageResult<ClockEntity>>;
    /// Replace the row only if its stored version equals `expected_version`.
    ///
    /// Returns `false` when another writer changed the row first.
    fn replace_clock(
        &self,
        expected_version: u64,
        clock: ClockEntity,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
