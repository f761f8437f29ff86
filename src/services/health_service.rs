use tracing::warn;

use crate::{
    dto::health::HealthResponse,
    state::{SharedState, clock::now_ms},
};

/// Probe the store and report whether the service can make progress.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_store().await {
        Ok(store) => {
            if let Err(err) = state.store_call(store.health_check()).await {
                warn!(error = %err, "storage health check failed");
            }
        }
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded(), now_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::{AppState, test_support::memory_state}};

    #[tokio::test]
    async fn reports_degraded_without_store() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        let (state, _store) = memory_state(50).await;
        assert!(health_status(&state).await.is_ok());
    }
}
