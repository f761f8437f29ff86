use serde::Serialize;
use tracing::warn;

use crate::{
    dao::models::WinnerEntity,
    dto::sse::{CheckpointEvent, ServerEvent, TimerUpdatedEvent, WinnerDecidedEvent},
    dto::timer::TimerAction,
    state::{
        SharedState,
        bracket::{Round, format_instant},
    },
};

const EVENT_TIMER_CHECKPOINT: &str = "timer.checkpoint";
const EVENT_WINNER_DECIDED: &str = "winner.decided";
const EVENT_TIMER_UPDATED: &str = "timer.updated";

/// Which of the two timers an action was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Checkpoint timer.
    Cycle,
    /// Coarse countdown.
    Countdown,
}

impl TimerKind {
    fn as_str(self) -> &'static str {
        match self {
            TimerKind::Cycle => "cycle",
            TimerKind::Countdown => "countdown",
        }
    }
}

/// Broadcast that `checkpoint` has been resolved for the cycle starting at `cycle_start_ms`.
pub fn broadcast_checkpoint(state: &SharedState, checkpoint: u8, round: Round, cycle_start_ms: i64) {
    let payload = CheckpointEvent {
        checkpoint,
        round,
        cycle_start: format_instant(cycle_start_ms),
    };
    send_public_event(state, EVENT_TIMER_CHECKPOINT, &payload);
}

/// Broadcast a freshly written winner record.
pub fn broadcast_winner_decided(state: &SharedState, winner: &WinnerEntity) {
    let payload = WinnerDecidedEvent {
        phase_key: winner.phase_key.clone(),
        color: winner.color,
    };
    send_public_event(state, EVENT_WINNER_DECIDED, &payload);
}

/// Broadcast that a timer action changed the clock row.
pub fn broadcast_timer_updated(state: &SharedState, timer: TimerKind, action: TimerAction, version: u64) {
    let payload = TimerUpdatedEvent {
        timer: timer.as_str().to_owned(),
        action: action.as_str().to_owned(),
        version,
    };
    send_public_event(state, EVENT_TIMER_UPDATED, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
