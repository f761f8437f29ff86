use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    dao::models::ClockEntity,
    services::stage_service::Stage,
    state::bracket::format_instant,
};

/// Control action accepted by both timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    /// Freeze the timer, capturing the remaining duration.
    Pause,
    /// Unfreeze, preserving the captured remaining duration.
    Resume,
    /// Start over from a full period at checkpoint 0.
    Reset,
    /// Force exactly one step forward.
    Advance,
}

impl TimerAction {
    /// Wire name of the action.
    pub fn as_str(self) -> &'static str {
        match self {
            TimerAction::Pause => "pause",
            TimerAction::Resume => "resume",
            TimerAction::Reset => "reset",
            TimerAction::Advance => "advance",
        }
    }
}

/// Body of `POST /timer` and `POST /countdown`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TimerActionRequest {
    pub action: TimerAction,
}

/// Query string of `GET /timer`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TimerQuery {
    /// Also run stage detection and include the result.
    #[serde(default)]
    pub include_stage: bool,
}

/// Read model of the checkpoint timer after catch-up.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimerResponse {
    /// Start of the current cycle (RFC 3339, whole seconds).
    pub cycle_start: String,
    pub period_sec: u32,
    pub paused: bool,
    /// Highest checkpoint whose round has been resolved (0..=5).
    pub last_checkpoint: u8,
    /// Seconds left in the cycle; frozen while paused.
    pub remaining_sec: i64,
    /// Instant the cycle ends if nothing is paused from now on.
    pub phase_end_at: String,
    /// Same instant as unix milliseconds, used by clients to order responses.
    pub phase_end_at_ms: i64,
    /// Instant of the next unresolved checkpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_checkpoint_at: Option<String>,
    /// Clock row version this view was read from.
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl TimerResponse {
    /// Project the cycle timer of `clock` at `now_ms`.
    pub fn from_clock(clock: &ClockEntity, now_ms: i64) -> Self {
        let cycle = &clock.cycle;
        let remaining_ms = cycle.remaining_ms(now_ms);
        let phase_end_at_ms = if cycle.paused() {
            now_ms + remaining_ms
        } else {
            cycle.phase_end_at_ms()
        };
        Self {
            cycle_start: format_instant(cycle.cycle_start_ms),
            period_sec: cycle.period_sec,
            paused: cycle.paused(),
            last_checkpoint: cycle.last_checkpoint,
            remaining_sec: ceil_seconds(remaining_ms),
            phase_end_at: format_instant(phase_end_at_ms),
            phase_end_at_ms,
            next_checkpoint_at: (!cycle.paused())
                .then(|| cycle.next_checkpoint_at_ms())
                .flatten()
                .map(format_instant),
            version: clock.version,
            stage: None,
        }
    }

    /// Attach a detected stage.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// Read model of the coarse countdown after rollover catch-up.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountdownResponse {
    pub phase_end_at: String,
    pub phase_end_at_ms: i64,
    pub period_sec: u32,
    pub paused: bool,
    pub remaining_sec: i64,
    /// Periods elapsed since the last reset.
    pub rollovers: u64,
    pub version: u64,
}

impl CountdownResponse {
    /// Project the countdown of `clock` at `now_ms`.
    pub fn from_clock(clock: &ClockEntity, now_ms: i64) -> Self {
        let countdown = &clock.countdown;
        let remaining_ms = countdown.remaining_ms(now_ms);
        let phase_end_at_ms = if countdown.paused() {
            now_ms + remaining_ms
        } else {
            countdown.phase_end_at_ms
        };
        Self {
            phase_end_at: format_instant(phase_end_at_ms),
            phase_end_at_ms,
            period_sec: countdown.period_sec,
            paused: countdown.paused(),
            remaining_sec: ceil_seconds(remaining_ms),
            rollovers: countdown.rollovers,
            version: clock.version,
        }
    }
}

fn ceil_seconds(ms: i64) -> i64 {
    (ms.max(0) + 999) / 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: i64 = 1_714_564_800_000;

    #[test]
    fn timer_view_reports_whole_seconds() {
        let mut clock = ClockEntity::initial(START, 50);
        clock.cycle.last_checkpoint = 1;
        let view = TimerResponse::from_clock(&clock, START + 9_500);
        assert_eq!(view.cycle_start, "2024-05-01T12:00:00Z");
        assert_eq!(view.remaining_sec, 41);
        assert_eq!(view.phase_end_at_ms, START + 50_000);
        assert_eq!(view.next_checkpoint_at.as_deref(), Some("2024-05-01T12:00:10.002Z"));
        assert!(view.stage.is_none());
    }

    #[test]
    fn partial_seconds_round_up() {
        assert_eq!(ceil_seconds(0), 0);
        assert_eq!(ceil_seconds(1), 1);
        assert_eq!(ceil_seconds(1_000), 1);
        assert_eq!(ceil_seconds(1_001), 2);
        assert_eq!(ceil_seconds(-250), 0);
    }

    #[test]
    fn paused_countdown_ends_remaining_after_now() {
        let mut clock = ClockEntity::initial(START, 50);
        clock.countdown.pause(START + 43_000);
        let later = START + 143_000;
        let view = CountdownResponse::from_clock(&clock, later);
        assert!(view.paused);
        assert_eq!(view.remaining_sec, 7);
        assert_eq!(view.phase_end_at_ms, later + 7_000);
    }
}
