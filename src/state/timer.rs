//! Timer records held in the singleton clock row and the pure transitions applied to them.
//!
//! Transitions return `false` when they leave the record untouched so callers can skip the
//! write entirely.

use serde::{Deserialize, Serialize};

use crate::state::{
    bracket::{PhaseKey, Round, truncate_to_second},
    clock::{CHECKPOINTS, PhaseClock},
};

/// Checkpoint-driven tournament timer: five round boundaries per cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimer {
    /// Instant the cycle began (whole second); anchors every phase key of the cycle.
    pub cycle_start_ms: i64,
    /// Length of a full cycle in seconds.
    pub period_sec: u32,
    /// Paused time accumulated since `cycle_start_ms`, excluded from clock accounting.
    pub paused_total_ms: i64,
    /// Set while paused: the instant the pause began.
    pub paused_at_ms: Option<i64>,
    /// Highest checkpoint whose round has been resolved.
    pub last_checkpoint: u8,
}

impl CycleTimer {
    /// Fresh cycle starting at `now_ms`.
    pub fn start(now_ms: i64, period_sec: u32) -> Self {
        Self {
            cycle_start_ms: truncate_to_second(now_ms),
            period_sec,
            paused_total_ms: 0,
            paused_at_ms: None,
            last_checkpoint: 0,
        }
    }

    /// Whether time accounting is frozen.
    pub fn paused(&self) -> bool {
        self.paused_at_ms.is_some()
    }

    /// Clock shifted by the accumulated pause time.
    pub fn clock(&self) -> PhaseClock {
        PhaseClock::new(self.cycle_start_ms + self.paused_total_ms, self.period_sec)
    }

    /// Wall-clock instant the clock should be evaluated at; frozen while paused.
    fn effective_now(&self, now_ms: i64) -> i64 {
        self.paused_at_ms.unwrap_or(now_ms)
    }

    /// Checkpoint that should have been resolved by `now_ms`.
    pub fn due_checkpoint(&self, now_ms: i64) -> u8 {
        self.clock().due_checkpoint(self.effective_now(now_ms))
    }

    /// Time left in the cycle.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.clock().remaining_ms(self.effective_now(now_ms))
    }

    /// Instant the cycle ends given the pauses recorded so far.
    pub fn phase_end_at_ms(&self) -> i64 {
        self.clock().end_ms()
    }

    /// Instant the next unresolved checkpoint fires, if any remain.
    pub fn next_checkpoint_at_ms(&self) -> Option<i64> {
        (self.last_checkpoint < CHECKPOINTS)
            .then(|| self.clock().checkpoint_at(self.last_checkpoint + 1))
    }

    /// Base timestamp shared by every phase key of `round` in this cycle.
    pub fn round_base_ms(&self, round: Round) -> i64 {
        let slice = PhaseClock::new(self.cycle_start_ms, self.period_sec).slice_ms();
        truncate_to_second(self.cycle_start_ms + i64::from(round.number() - 1) * slice)
    }

    /// Every phase key of `round` in this cycle, in slot order.
    pub fn round_keys(&self, round: Round) -> Vec<PhaseKey> {
        let base = self.round_base_ms(round);
        round.slots().map(|slot| PhaseKey::new(base, slot)).collect()
    }

    /// Freeze time accounting. No-op when already paused.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if self.paused() {
            return false;
        }
        self.paused_at_ms = Some(now_ms);
        true
    }

    /// Resume so the remaining duration captured at pause time is preserved exactly.
    pub fn resume(&mut self, now_ms: i64) -> bool {
        let Some(paused_at) = self.paused_at_ms.take() else {
            return false;
        };
        self.paused_total_ms += (now_ms - paused_at).max(0);
        true
    }

    /// Start a new cycle at `now_ms` with checkpoint 0.
    pub fn reset(&mut self, now_ms: i64) {
        *self = Self::start(now_ms, self.period_sec);
    }

    /// Record that every checkpoint up to `checkpoint` has been resolved.
    pub fn mark_resolved(&mut self, checkpoint: u8) -> bool {
        let checkpoint = checkpoint.min(CHECKPOINTS);
        if checkpoint <= self.last_checkpoint {
            return false;
        }
        self.last_checkpoint = checkpoint;
        true
    }
}

/// Coarse countdown: one period at a time, rolling over when it runs out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    /// Instant the running period ends.
    pub phase_end_at_ms: i64,
    /// Period length in seconds.
    pub period_sec: u32,
    /// Remaining duration captured when paused.
    pub paused_remaining_ms: Option<i64>,
    /// Number of periods that have elapsed since the last reset.
    pub rollovers: u64,
}

/// Outcome of rolling a countdown forward to the present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
    /// Rollover counter before catching up.
    pub from: u64,
    /// Number of periods that ended.
    pub count: u64,
    /// End instant of the first period that ended.
    pub first_end_ms: i64,
}

impl Countdown {
    /// Countdown whose first period starts at `now_ms`.
    pub fn start(now_ms: i64, period_sec: u32) -> Self {
        Self {
            phase_end_at_ms: now_ms + period_ms(period_sec),
            period_sec,
            paused_remaining_ms: None,
            rollovers: 0,
        }
    }

    /// Whether the countdown is frozen.
    pub fn paused(&self) -> bool {
        self.paused_remaining_ms.is_some()
    }

    /// Time left in the running period.
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        self.paused_remaining_ms
            .unwrap_or_else(|| (self.phase_end_at_ms - now_ms).max(0))
    }

    /// Advance `phase_end_at_ms` past `now_ms` by whole periods.
    pub fn catch_up(&mut self, now_ms: i64) -> Option<Rollover> {
        if self.paused() || now_ms < self.phase_end_at_ms {
            return None;
        }
        let period = period_ms(self.period_sec);
        let count = ((now_ms - self.phase_end_at_ms) / period + 1) as u64;
        let rollover = Rollover {
            from: self.rollovers,
            count,
            first_end_ms: self.phase_end_at_ms,
        };
        self.phase_end_at_ms += period * count as i64;
        self.rollovers += count;
        Some(rollover)
    }

    /// Freeze and capture the remaining duration. No-op when already paused.
    pub fn pause(&mut self, now_ms: i64) -> bool {
        if self.paused() {
            return false;
        }
        self.paused_remaining_ms = Some((self.phase_end_at_ms - now_ms).max(0));
        true
    }

    /// Unfreeze with a fresh end time preserving the captured remaining duration.
    pub fn resume(&mut self, now_ms: i64) -> bool {
        let Some(remaining) = self.paused_remaining_ms.take() else {
            return false;
        };
        self.phase_end_at_ms = now_ms + remaining;
        true
    }

    /// Restart from a full period at `now_ms`.
    pub fn reset(&mut self, now_ms: i64) {
        *self = Self::start(now_ms, self.period_sec);
    }

    /// End the running period now and start the next one.
    pub fn advance(&mut self, now_ms: i64) -> Rollover {
        let rollover = Rollover {
            from: self.rollovers,
            count: 1,
            first_end_ms: now_ms,
        };
        self.phase_end_at_ms = now_ms + period_ms(self.period_sec);
        self.paused_remaining_ms = self
            .paused_remaining_ms
            .map(|_| period_ms(self.period_sec));
        self.rollovers += 1;
        rollover
    }
}

fn period_ms(period_sec: u32) -> i64 {
    i64::from(period_sec.max(1)) * 1_000
}
