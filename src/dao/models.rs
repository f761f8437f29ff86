use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    bracket::Color,
    timer::{Countdown, CycleTimer},
};

/// Identifier of the singleton clock row.
pub const CLOCK_ROW_ID: &str = "clock";

/// A viewer's choice for one matchup. Keyed by `(phase_key, voter_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    /// Phase key of the matchup.
    pub phase_key: String,
    /// Identity issued by the session provider.
    pub voter_id: Uuid,
    /// Image the voter picked.
    pub color: Color,
    /// Unix milliseconds of the latest write.
    pub cast_at_ms: i64,
}

/// Vote counts for one phase key.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TallyEntity {
    /// Votes for the first image.
    pub red: u64,
    /// Votes for the second image.
    pub blue: u64,
}

impl TallyEntity {
    /// Count one more vote for `color`.
    pub fn add(&mut self, color: Color) {
        match color {
            Color::Red => self.red += 1,
            Color::Blue => self.blue += 1,
        }
    }
}

/// Decided outcome of a matchup. Written at most once per phase key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WinnerEntity {
    /// Phase key of the matchup.
    pub phase_key: String,
    /// Winning side.
    pub color: Color,
    /// Unix milliseconds of the decision.
    pub decided_at_ms: i64,
}

/// Result of an idempotent winner insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinnerInsert {
    /// This call wrote the record.
    Inserted(WinnerEntity),
    /// Another writer got there first; the stored record is returned unchanged.
    Existing(WinnerEntity),
}

impl WinnerInsert {
    /// Record that is now stored, whoever wrote it.
    pub fn into_record(self) -> WinnerEntity {
        match self {
            WinnerInsert::Inserted(record) | WinnerInsert::Existing(record) => record,
        }
    }

    /// Whether this call performed the write.
    pub fn inserted(&self) -> bool {
        matches!(self, WinnerInsert::Inserted(_))
    }
}

/// Singleton row holding both timers. Every write is a compare-and-set on `version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClockEntity {
    /// Incremented by one on every successful write.
    pub version: u64,
    /// Checkpoint timer driving round resolution.
    pub cycle: CycleTimer,
    /// Coarse full-period countdown.
    pub countdown: Countdown,
}

impl ClockEntity {
    /// Default row written on first-ever access.
    pub fn initial(now_ms: i64, period_sec: u32) -> Self {
        Self {
            version: 0,
            cycle: CycleTimer::start(now_ms, period_sec),
            countdown: Countdown::start(now_ms, period_sec),
        }
    }

    /// Copy of this row with the version bumped, ready to be written.
    pub fn successor(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}
