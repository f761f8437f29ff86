use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{storage::StorageError, tournament_store::TournamentStore},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Keep a store connected, toggling degraded mode as its health changes.
///
/// `connect` is retried with exponential backoff until it succeeds; the resulting store is
/// health-checked every few seconds and reconnected in place when a check fails.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn TournamentStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                watch(&state, store.as_ref()).await;
                warn!("exhausted storage reconnect attempts; staying in degraded mode");
                state.clear_store().await;

                sleep(delay).await;
                delay = next_delay(delay);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
}

/// Health-check `store` until reconnecting it fails for good.
async fn watch(state: &SharedState, store: &dyn TournamentStore) {
    loop {
        match state.store_call(store.health_check()).await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if !reconnect(state, store).await {
                    return;
                }
                state.update_degraded(false);
                sleep(HEALTH_POLL_INTERVAL).await;
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn TournamentStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(attempt, error = %err, "storage reconnect first attempt failed; entering degraded mode");
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(delay).await;
                delay = next_delay(delay);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::future::{BoxFuture, pending};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{ClockEntity, TallyEntity, VoteEntity, WinnerEntity, WinnerInsert},
            storage::StorageResult,
            tournament_store::memory::MemoryTournamentStore,
        },
        state::AppState,
    };

    /// Store whose pings never answer and which cannot reconnect.
    struct UnresponsiveStore;

    impl TournamentStore for UnresponsiveStore {
        fn upsert_vote(&self, _vote: VoteEntity) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(pending())
        }
        fn tally_votes(&self, _key: String) -> BoxFuture<'static, StorageResult<TallyEntity>> {
            Box::pin(pending())
        }
        fn find_winner(
            &self,
            _key: String,
        ) -> BoxFuture<'static, StorageResult<Option<WinnerEntity>>> {
            Box::pin(pending())
        }
        fn insert_winner(
            &self,
            _winner: WinnerEntity,
        ) -> BoxFuture<'static, StorageResult<WinnerInsert>> {
            Box::pin(pending())
        }
        fn load_clock(&self) -> BoxFuture<'static, StorageResult<Option<ClockEntity>>> {
            Box::pin(pending())
        }
        fn init_clock(&self, _clock: ClockEntity) -> BoxFuture<'static, StorageResult<ClockEntity>> {
            Box::pin(pending())
        }
        fn replace_clock(
            &self,
            _expected: u64,
            _clock: ClockEntity,
        ) -> BoxFuture<'static, StorageResult<bool>> {
            Box::pin(pending())
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(pending())
        }
        fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async { Err(StorageError::corrupt("ping", "unreachable")) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected() {
        let state = AppState::new(AppConfig::default());
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StorageError::corrupt("clock", "not yet"))
                } else {
                    Ok(Arc::new(MemoryTournamentStore::new()) as Arc<dyn TournamentStore>)
                }
            }
        }));

        let mut watcher = state.degraded_watcher();
        tokio::time::timeout(Duration::from_secs(60), watcher.wait_for(|degraded| !degraded))
            .await
            .expect("supervisor should connect")
            .expect("degraded channel open");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(state.store().await.is_some());

        supervisor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn hung_health_check_enters_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let supervisor = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(UnresponsiveStore) as Arc<dyn TournamentStore>)
        }));

        let mut watcher = state.degraded_watcher();
        watcher.wait_for(|degraded| !degraded).await.unwrap();
        tokio::time::timeout(Duration::from_secs(60), watcher.wait_for(|degraded| *degraded))
            .await
            .expect("a hung ping must time out")
            .expect("degraded channel open");

        supervisor.abort();
    }
}
