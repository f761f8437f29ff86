//! Pure countdown arithmetic shared by the catch-up driver and the read models.

use time::OffsetDateTime;

/// Number of checkpoints in a cycle, one per round.
pub const CHECKPOINTS: u8 = 5;

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Step function mapping wall-clock time to the checkpoint a cycle has reached.
///
/// A cycle of `period_ms` is cut into five slices of `floor(period_ms / 5)`; the checkpoint
/// is `5 - min(5, floor((remaining + 1) / slice))` where `remaining` counts down the current
/// repetition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseClock {
    anchor_ms: i64,
    period_ms: i64,
}

impl PhaseClock {
    /// Clock whose cycles start at `anchor_ms` and last `period_sec` seconds.
    pub fn new(anchor_ms: i64, period_sec: u32) -> Self {
        Self {
            anchor_ms,
            period_ms: i64::from(period_sec.max(1)) * 1_000,
        }
    }

    /// Full cycle length in milliseconds.
    pub fn period_ms(&self) -> i64 {
        self.period_ms
    }

    /// Length of one checkpoint slice in milliseconds.
    pub fn slice_ms(&self) -> i64 {
        self.period_ms / i64::from(CHECKPOINTS)
    }

    /// Milliseconds elapsed in the current repetition of the cycle.
    pub fn elapsed_in_cycle(&self, now_ms: i64) -> i64 {
        (now_ms - self.anchor_ms).rem_euclid(self.period_ms)
    }

    /// Checkpoint reached within the current repetition; drops back to 0 at every boundary.
    pub fn cyclic_checkpoint(&self, now_ms: i64) -> u8 {
        let remaining = self.period_ms - self.elapsed_in_cycle(now_ms);
        let slices_left = ((remaining + 1) / self.slice_ms()).clamp(0, i64::from(CHECKPOINTS));
        CHECKPOINTS - slices_left as u8
    }

    /// Checkpoint due for the cycle anchored at `anchor_ms`, saturating at 5 once a whole
    /// period has elapsed so wrap-around never hides an unresolved boundary.
    pub fn due_checkpoint(&self, now_ms: i64) -> u8 {
        let elapsed = now_ms - self.anchor_ms;
        if elapsed < 0 {
            0
        } else if elapsed >= self.period_ms {
            CHECKPOINTS
        } else {
            self.cyclic_checkpoint(now_ms)
        }
    }

    /// Milliseconds left before the cycle anchored at `anchor_ms` ends (never negative).
    pub fn remaining_ms(&self, now_ms: i64) -> i64 {
        (self.anchor_ms + self.period_ms - now_ms).clamp(0, self.period_ms)
    }

    /// Instant the cycle ends.
    pub fn end_ms(&self) -> i64 {
        self.anchor_ms + self.period_ms
    }

    /// First instant of the cycle at which `checkpoint` is reached.
    pub fn checkpoint_at(&self, checkpoint: u8) -> i64 {
        let checkpoint = checkpoint.min(CHECKPOINTS);
        if checkpoint == 0 {
            return self.anchor_ms;
        }
        // Smallest elapsed time with `remaining + 1 < (6 - checkpoint) * slice`.
        let slices_left = i64::from(CHECKPOINTS - checkpoint + 1);
        self.anchor_ms + self.period_ms + 2 - slices_left * self.slice_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: i64 = 1_714_564_800_000;

    #[test]
    fn starts_at_zero_and_steps_each_slice() {
        let clock = PhaseClock::new(START, 50);
        assert_eq!(clock.slice_ms(), 10_000);
        assert_eq!(clock.cyclic_checkpoint(START), 0);
        assert_eq!(clock.cyclic_checkpoint(START + 1), 0);
        assert_eq!(clock.cyclic_checkpoint(START + 2), 1);
        for k in 1..=5u8 {
            let slice_end = START + i64::from(k) * 10_000;
            assert_eq!(clock.cyclic_checkpoint(slice_end - 1), k, "at {k} slices - 1 ms");
        }
        assert_eq!(clock.cyclic_checkpoint(START + 10_001), 1);
        assert_eq!(clock.cyclic_checkpoint(START + 10_002), 2);
        assert_eq!(clock.cyclic_checkpoint(START + 40_001), 4);
        assert_eq!(clock.cyclic_checkpoint(START + 40_002), 5);
    }

    #[test]
    fn matches_remaining_time_formula() {
        for period_sec in [5, 7, 12, 50, 301] {
            let clock = PhaseClock::new(START, period_sec);
            let period_ms = clock.period_ms();
            let slice = clock.slice_ms();
            for offset in (0..period_ms).step_by(37).chain([1, 2, period_ms - 1]) {
                let remaining = period_ms - offset;
                let expected = 5 - ((remaining + 1) / slice).min(5);
                assert_eq!(
                    i64::from(clock.cyclic_checkpoint(START + offset)),
                    expected,
                    "period {period_sec}s, offset {offset} ms"
                );
            }
        }
    }

    #[test]
    fn checkpoint_instants_are_first_reached() {
        for period_sec in [5, 7, 50, 301] {
            let clock = PhaseClock::new(START, period_sec);
            for k in 1..=CHECKPOINTS {
                let at = clock.checkpoint_at(k);
                assert_eq!(clock.cyclic_checkpoint(at), k);
                assert_eq!(clock.cyclic_checkpoint(at - 1), k - 1);
            }
            assert_eq!(clock.checkpoint_at(0), START);
        }
    }

    #[test]
    fn monotonic_within_a_cycle_and_reset_at_boundaries() {
        for period_sec in [5, 7, 12, 50, 301] {
            let clock = PhaseClock::new(START, period_sec);
            let period_ms = clock.period_ms();
            for cycle in 0..3 {
                let cycle_start = START + cycle * period_ms;
                assert_eq!(clock.cyclic_checkpoint(cycle_start), 0);
                let mut previous = 0;
                for offset in (0..period_ms).step_by(97) {
                    let checkpoint = clock.cyclic_checkpoint(cycle_start + offset);
                    assert!(checkpoint >= previous, "regressed at {offset} ms");
                    assert!(checkpoint <= CHECKPOINTS);
                    previous = checkpoint;
                }
            }
        }
    }

    #[test]
    fn handles_times_before_anchor() {
        let clock = PhaseClock::new(START, 50);
        assert!(clock.cyclic_checkpoint(START - 1) <= CHECKPOINTS);
        assert_eq!(clock.due_checkpoint(START - 1), 0);
    }

    #[test]
    fn due_checkpoint_saturates_after_full_period() {
        let clock = PhaseClock::new(START, 50);
        assert_eq!(clock.due_checkpoint(START + 30_000), 3);
        assert_eq!(clock.due_checkpoint(START + 50_000), 5);
        assert_eq!(clock.due_checkpoint(START + 5_000_000), 5);
        assert_eq!(clock.cyclic_checkpoint(START + 50_000), 0);
    }

    #[test]
    fn remaining_time_is_clamped() {
        let clock = PhaseClock::new(START, 50);
        assert_eq!(clock.remaining_ms(START), 50_000);
        assert_eq!(clock.remaining_ms(START + 43_000), 7_000);
        assert_eq!(clock.remaining_ms(START + 60_000), 0);
        assert_eq!(clock.checkpoint_at(2), START + 10_002);
        assert_eq!(clock.checkpoint_at(5), START + 40_002);
    }
}
