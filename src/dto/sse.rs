use serde::Serialize;
use utoipa::ToSchema;

use crate::state::bracket::{Color, Round};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Event carrying a plain string payload.
    pub fn new<E>(event: E, data: String) -> Self
    where
        E: Into<Option<String>>,
    {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once per checkpoint when its round has been resolved and recorded.
pub struct CheckpointEvent {
    /// Checkpoint number (1..=5).
    pub checkpoint: u8,
    /// Round that ended at this checkpoint.
    pub round: Round,
    /// Start of the cycle the checkpoint belongs to (RFC 3339).
    pub cycle_start: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast by the request that wrote a winner record.
pub struct WinnerDecidedEvent {
    pub phase_key: String,
    pub color: Color,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after a timer action changed the clock row.
pub struct TimerUpdatedEvent {
    /// `cycle` or `countdown`.
    pub timer: String,
    /// Action that was applied.
    pub action: String,
    /// Clock row version after the write.
    pub version: u64,
}
