use serde::Serialize;
use utoipa::ToSchema;

use crate::state::bracket::format_instant;

/// Liveness payload returned by `/healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while no store is reachable.
    pub status: String,
    /// Server time the check ran at (RFC 3339), handy for spotting clock skew.
    pub checked_at: String,
}

impl HealthResponse {
    /// Build the payload for the given degraded flag.
    pub fn new(degraded: bool, now_ms: i64) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_owned(),
            checked_at: format_instant(now_ms),
        }
    }

    /// Whether the status reports a usable store.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
