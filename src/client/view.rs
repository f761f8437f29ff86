use super::TimerResponse;

/// What a viewer currently shows, rebuilt from server snapshots.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Latest snapshot applied, kept while offline.
    pub timer: Option<TimerResponse>,
    /// Whether the most recent poll reached the server.
    pub online: bool,
    /// Polls in a row that exhausted their retries.
    pub failed_polls: u32,
    pub last_error: Option<String>,
}

/// Ordering key for snapshots: phase end first, clock row version second.
fn freshness(snapshot: &TimerResponse) -> (i64, u64) {
    (snapshot.phase_end_at_ms, snapshot.version)
}

/// Whether `candidate` is strictly newer than what `view` already shows.
pub fn is_newer(view: &ViewState, candidate: &TimerResponse) -> bool {
    view.timer
        .as_ref()
        .is_none_or(|current| freshness(candidate) > freshness(current))
}

/// Apply a successful poll; older or duplicate snapshots leave the timer untouched.
pub fn apply_snapshot(view: &ViewState, snapshot: TimerResponse) -> ViewState {
    let timer = if is_newer(view, &snapshot) {
        Some(snapshot)
    } else {
        view.timer.clone()
    };
    ViewState {
        timer,
        online: true,
        failed_polls: 0,
        last_error: None,
    }
}

/// Record a poll that failed for good; the last known timer stays on screen.
pub fn apply_failure(view: &ViewState, error: impl ToString) -> ViewState {
    ViewState {
        timer: view.timer.clone(),
        online: false,
        failed_polls: view.failed_polls.saturating_add(1),
        last_error: Some(error.to_string()),
    }
}

/// Seconds to display at `now_ms`, extrapolated locally between polls.
pub fn display_remaining_sec(view: &ViewState, now_ms: i64) -> Option<i64> {
    let timer = view.timer.as_ref()?;
    if timer.paused {
        return Some(timer.remaining_sec);
    }
    let remaining_ms = (timer.phase_end_at_ms - now_ms).max(0);
    Some((remaining_ms + 999) / 1_000)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn snapshot(phase_end_at_ms: i64, version: u64) -> TimerResponse {
        TimerResponse {
            cycle_start: "2024-05-01T12:00:00Z".into(),
            period_sec: 300,
            paused: false,
            last_checkpoint: 0,
            remaining_sec: 300,
            phase_end_at: "2024-05-01T12:05:00Z".into(),
            phase_end_at_ms,
            next_checkpoint_at: None,
            version,
            stage: None,
        }
    }

    #[test]
    fn later_phase_end_wins_regardless_of_arrival() {
        let view = apply_snapshot(&ViewState::default(), snapshot(2_000, 3));
        let view = apply_snapshot(&view, snapshot(1_000, 9));
        assert_eq!(view.timer.as_ref().map(|t| t.phase_end_at_ms), Some(2_000));
        assert!(view.online);
    }

    #[test]
    fn same_phase_end_uses_version() {
        let view = apply_snapshot(&ViewState::default(), snapshot(2_000, 3));
        assert!(!is_newer(&view, &snapshot(2_000, 3)));
        assert!(is_newer(&view, &snapshot(2_000, 4)));
        let view = apply_snapshot(&view, snapshot(2_000, 4));
        assert_eq!(view.timer.as_ref().map(|t| t.version), Some(4));
    }

    #[test]
    fn failure_keeps_last_known_timer() {
        let view = apply_snapshot(&ViewState::default(), snapshot(2_000, 1));
        let view = apply_failure(&view, "server returned 503: storage unavailable");
        let view = apply_failure(&view, "timeout");
        assert!(!view.online);
        assert_eq!(view.failed_polls, 2);
        assert_eq!(view.last_error.as_deref(), Some("timeout"));
        assert!(view.timer.is_some());

        let view = apply_snapshot(&view, snapshot(2_000, 1));
        assert!(view.online);
        assert_eq!(view.failed_polls, 0);
    }

    #[test]
    fn remaining_is_extrapolated_unless_paused() {
        let view = apply_snapshot(&ViewState::default(), snapshot(10_000, 1));
        assert_eq!(display_remaining_sec(&view, 8_500), Some(2));
        assert_eq!(display_remaining_sec(&view, 12_000), Some(0));

        let mut paused = snapshot(10_000, 2);
        paused.paused = true;
        paused.remaining_sec = 42;
        let view = apply_snapshot(&view, paused);
        assert_eq!(display_remaining_sec(&view, 99_000), Some(42));
        assert_eq!(display_remaining_sec(&ViewState::default(), 0), None);
    }
}
