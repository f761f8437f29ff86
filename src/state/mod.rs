pub mod bracket;
mod cache;
pub mod clock;
mod sse;
pub mod timer;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{RwLock, watch};
use tokio::time::timeout;
use tracing::warn;

use crate::{
    config::AppConfig,
    dao::{storage::StorageResult, tournament_store::TournamentStore},
    error::ServiceError,
};

pub use self::cache::BracketCache;
pub use self::sse::SseHub;

pub type SharedState = Arc<AppState>;

const PUBLIC_SSE_CAPACITY: usize = 64;

/// Central application state: the storage handle, the degraded flag, and droppable caches.
///
/// Nothing in here serializes tournament progress; that lives in the store.
pub struct AppState {
    store: RwLock<Option<Arc<dyn TournamentStore>>>,
    degraded: watch::Sender<bool>,
    public_sse: SseHub,
    bracket_cache: BracketCache,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            store: RwLock::new(None),
            degraded: degraded_tx,
            public_sse: SseHub::new(PUBLIC_SSE_CAPACITY),
            bracket_cache: BracketCache::new(config.bracket_cache_capacity()),
            config,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn TournamentStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] when none is usable.
    pub async fn require_store(&self) -> Result<Arc<dyn TournamentStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn set_store(&self, store: Arc<dyn TournamentStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Broadcast hub used for the public SSE stream.
    pub fn public_sse(&self) -> &SseHub {
        &self.public_sse
    }

    /// Memo of resolved bracket survivors for the current cycle.
    pub fn bracket_cache(&self) -> &BracketCache {
        &self.bracket_cache
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Await a store call, bounded by the configured store timeout.
    pub async fn store_call<T>(
        &self,
        call: BoxFuture<'static, StorageResult<T>>,
    ) -> Result<T, ServiceError> {
        match timeout(self.config.store_timeout(), call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(
                    timeout_ms = self.config.store_timeout().as_millis() as u64,
                    "store call timed out"
                );
                Err(ServiceError::Timeout)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::dao::tournament_store::memory::MemoryTournamentStore;

    /// State backed by a fresh in-memory store.
    pub async fn memory_state(period_sec: u32) -> (SharedState, MemoryTournamentStore) {
        let state = AppState::new(AppConfig::default().with_period_sec(period_sec));
        let store = MemoryTournamentStore::new();
        state.set_store(Arc::new(store.clone())).await;
        (state, store)
    }
}
