//! Catch-up driver and control actions for the singleton clock row.
//!
//! Every request observes the row, replays whatever checkpoints or rollovers are due, and
//! records progress with a compare-and-set on the row version. Losing that race means a
//! concurrent request already recorded the same progress.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    dao::{models::ClockEntity, tournament_store::TournamentStore},
    dto::timer::{CountdownResponse, TimerAction, TimerResponse},
    error::ServiceError,
    services::{
        resolver::{self, Decision},
        sse_events::{self, TimerKind},
        stage_service,
    },
    state::{
        SharedState,
        bracket::{Round, format_instant},
        clock::CHECKPOINTS,
        timer::Rollover,
    },
};

/// Compare-and-set attempts made by a control action before giving up.
pub const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Clock row after catch-up plus the decisions made on the way.
#[derive(Debug, Clone)]
pub struct CycleSync {
    pub clock: ClockEntity,
    /// Decisions for every round resolved by this pass, in play order.
    pub decided: Vec<Decision>,
}

/// Load the clock row, creating it with defaults on first access.
pub async fn load_or_init(
    state: &SharedState,
    store: &Arc<dyn TournamentStore>,
    now_ms: i64,
) -> Result<ClockEntity, ServiceError> {
    if let Some(clock) = state.store_call(store.load_clock()).await? {
        return Ok(clock);
    }

    let initial = ClockEntity::initial(now_ms, state.config().period_sec());
    let stored = state.store_call(store.init_clock(initial)).await?;
    info!(
        cycle_start = %format_instant(stored.cycle.cycle_start_ms),
        period_sec = stored.cycle.period_sec,
        "initialized clock row"
    );
    Ok(stored)
}

async fn reload(
    state: &SharedState,
    store: &Arc<dyn TournamentStore>,
    now_ms: i64,
) -> Result<ClockEntity, ServiceError> {
    load_or_init(state, store, now_ms).await
}

/// Resolve every checkpoint that came due since the last observation.
pub async fn sync_cycle(state: &SharedState, now_ms: i64) -> Result<CycleSync, ServiceError> {
    let store = state.require_store().await?;
    let clock = load_or_init(state, &store, now_ms).await?;
    catch_up_cycle(state, &store, clock, now_ms).await
}

async fn catch_up_cycle(
    state: &SharedState,
    store: &Arc<dyn TournamentStore>,
    clock: ClockEntity,
    now_ms: i64,
) -> Result<CycleSync, ServiceError> {
    state
        .bracket_cache()
        .observe_cycle(clock.cycle.cycle_start_ms);

    let last = clock.cycle.last_checkpoint;
    let due = if clock.cycle.paused() {
        last
    } else {
        clock.cycle.due_checkpoint(now_ms)
    };
    if due <= last {
        return Ok(CycleSync {
            clock,
            decided: Vec::new(),
        });
    }

    let mut decided = Vec::new();
    for checkpoint in (last + 1)..=due {
        let Some(round) = Round::from_checkpoint(checkpoint) else {
            continue;
        };
        let base_ms = clock.cycle.round_base_ms(round);
        decided.extend(resolver::decide_round(state, base_ms, round).await?);
    }

    let mut next = clock.successor();
    next.cycle.mark_resolved(due);
    if state
        .store_call(store.replace_clock(clock.version, next.clone()))
        .await?
    {
        for checkpoint in (last + 1)..=due {
            if let Some(round) = Round::from_checkpoint(checkpoint) {
                info!(checkpoint, %round, "checkpoint resolved");
                sse_events::broadcast_checkpoint(state, checkpoint, round, next.cycle.cycle_start_ms);
            }
        }
        return Ok(CycleSync {
            clock: next,
            decided,
        });
    }

    debug!(
        expected_version = clock.version,
        "clock row advanced by a concurrent request; reloading"
    );
    let fresher = reload(state, store, now_ms).await?;
    Ok(CycleSync {
        clock: fresher,
        decided,
    })
}

/// Roll the countdown forward past `now_ms`, logging each elapsed period once.
pub async fn sync_countdown(state: &SharedState, now_ms: i64) -> Result<ClockEntity, ServiceError> {
    let store = state.require_store().await?;
    let clock = load_or_init(state, &store, now_ms).await?;

    let mut next = clock.successor();
    let Some(rollover) = next.countdown.catch_up(now_ms) else {
        return Ok(clock);
    };

    if state
        .store_call(store.replace_clock(clock.version, next.clone()))
        .await?
    {
        log_rollovers(rollover, next.countdown.period_sec);
        return Ok(next);
    }

    debug!(
        expected_version = clock.version,
        "countdown rolled over by a concurrent request; reloading"
    );
    reload(state, &store, now_ms).await
}

fn log_rollovers(rollover: Rollover, period_sec: u32) {
    let period_ms = i64::from(period_sec) * 1_000;
    for offset in 0..rollover.count {
        info!(
            rollover = rollover.from + offset + 1,
            ended_at = %format_instant(rollover.first_end_ms + period_ms * offset as i64),
            "countdown period ended"
        );
    }
}

/// Apply a control action to the checkpoint timer.
pub async fn apply_cycle_action(
    state: &SharedState,
    action: TimerAction,
    now_ms: i64,
) -> Result<ClockEntity, ServiceError> {
    let store = state.require_store().await?;

    if action != TimerAction::Reset {
        // Anything already due belongs to the timeline before this action.
        sync_cycle(state, now_ms).await?;
    }

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let current = load_or_init(state, &store, now_ms).await?;
        let mut next = current.successor();
        let mut resolved = None;

        let changed = match action {
            TimerAction::Pause => next.cycle.pause(now_ms),
            TimerAction::Resume => next.cycle.resume(now_ms),
            TimerAction::Reset => {
                next.cycle.reset(now_ms);
                true
            }
            TimerAction::Advance => {
                let checkpoint = current.cycle.last_checkpoint + 1;
                let round = Round::from_checkpoint(checkpoint).ok_or_else(|| {
                    ServiceError::InvalidState(
                        "final already decided; reset to start a new cycle".into(),
                    )
                })?;
                resolver::decide_round(state, current.cycle.round_base_ms(round), round).await?;
                resolved = Some((checkpoint, round));
                next.cycle.mark_resolved(checkpoint)
            }
        };

        if !changed {
            debug!(action = action.as_str(), "cycle action already in effect");
            return Ok(current);
        }

        if state
            .store_call(store.replace_clock(current.version, next.clone()))
            .await?
        {
            if action == TimerAction::Reset {
                state.bracket_cache().invalidate();
            }
            if let Some((checkpoint, round)) = resolved {
                sse_events::broadcast_checkpoint(state, checkpoint, round, next.cycle.cycle_start_ms);
            }
            info!(
                action = action.as_str(),
                version = next.version,
                last_checkpoint = next.cycle.last_checkpoint,
                cycle_start = %format_instant(next.cycle.cycle_start_ms),
                "cycle timer updated"
            );
            sse_events::broadcast_timer_updated(state, TimerKind::Cycle, action, next.version);
            return Ok(next);
        }

        debug!(attempt, action = action.as_str(), "clock row changed concurrently; retrying");
    }

    Err(ServiceError::Contended {
        attempts: MAX_WRITE_ATTEMPTS,
    })
}

/// Apply a control action to the coarse countdown.
pub async fn apply_countdown_action(
    state: &SharedState,
    action: TimerAction,
    now_ms: i64,
) -> Result<ClockEntity, ServiceError> {
    let store = state.require_store().await?;

    if action != TimerAction::Reset {
        sync_countdown(state, now_ms).await?;
    }

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let current = load_or_init(state, &store, now_ms).await?;
        let mut next = current.successor();
        let mut rollover = None;

        let changed = match action {
            TimerAction::Pause => next.countdown.pause(now_ms),
            TimerAction::Resume => next.countdown.resume(now_ms),
            TimerAction::Reset => {
                next.countdown.reset(now_ms);
                true
            }
            TimerAction::Advance => {
                rollover = Some(next.countdown.advance(now_ms));
                true
            }
        };

        if !changed {
            debug!(action = action.as_str(), "countdown action already in effect");
            return Ok(current);
        }

        if state
            .store_call(store.replace_clock(current.version, next.clone()))
            .await?
        {
            if let Some(rollover) = rollover {
                log_rollovers(rollover, next.countdown.period_sec);
            }
            info!(
                action = action.as_str(),
                version = next.version,
                phase_end_at = %format_instant(next.countdown.phase_end_at_ms),
                "countdown updated"
            );
            sse_events::broadcast_timer_updated(state, TimerKind::Countdown, action, next.version);
            return Ok(next);
        }

        debug!(attempt, action = action.as_str(), "clock row changed concurrently; retrying");
    }

    Err(ServiceError::Contended {
        attempts: MAX_WRITE_ATTEMPTS,
    })
}

/// Catch up and project the checkpoint timer, optionally with the detected stage.
pub async fn timer_view(
    state: &SharedState,
    include_stage: bool,
    now_ms: i64,
) -> Result<TimerResponse, ServiceError> {
    let sync = sync_cycle(state, now_ms).await?;
    let view = TimerResponse::from_clock(&sync.clock, now_ms);
    if !include_stage {
        return Ok(view);
    }
    let stage = stage_service::detect_stage(state, &sync.clock.cycle).await?;
    Ok(view.with_stage(stage))
}

/// Catch up and project the countdown.
pub async fn countdown_view(
    state: &SharedState,
    now_ms: i64,
) -> Result<CountdownResponse, ServiceError> {
    let clock = sync_countdown(state, now_ms).await?;
    Ok(CountdownResponse::from_clock(&clock, now_ms))
}

/// Whether the cycle has resolved its final.
pub fn cycle_complete(clock: &ClockEntity) -> bool {
    clock.cycle.last_checkpoint >= CHECKPOINTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::tournament_store::memory::MemoryTournamentStore,
        state::{test_support::memory_state, timer::CycleTimer},
    };

    const START: i64 = 1_714_564_800_000;
    const PERIOD_SEC: u32 = 50;
    const SLICE_MS: i64 = 10_000;

    async fn seed_clock(store: &MemoryTournamentStore, last_checkpoint: u8) -> ClockEntity {
        let mut clock = ClockEntity::initial(START, PERIOD_SEC);
        clock.cycle.last_checkpoint = last_checkpoint;
        store.init_clock(clock).await.unwrap()
    }

    #[tokio::test]
    async fn first_request_initializes_clock() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        let sync = sync_cycle(&state, START + 1).await.unwrap();
        assert_eq!(sync.clock.cycle, CycleTimer::start(START, PERIOD_SEC));
        assert!(sync.decided.is_empty());
        assert_eq!(store.load_clock().await.unwrap(), Some(sync.clock));
    }

    #[tokio::test]
    async fn catch_up_resolves_missed_rounds_in_order_once() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 1).await;
        let now = START + 3 * SLICE_MS + 500;

        let sync = sync_cycle(&state, now).await.unwrap();
        assert_eq!(sync.clock.cycle.last_checkpoint, 4);
        assert_eq!(sync.decided.len(), 8 + 4 + 2);
        let rounds: Vec<Round> = sync
            .decided
            .iter()
            .map(|decision| decision.phase_key.slot().round())
            .collect();
        assert!(rounds[..8].iter().all(|round| *round == Round::RoundOf16));
        assert!(rounds[8..12].iter().all(|round| *round == Round::Quarterfinal));
        assert!(rounds[12..].iter().all(|round| *round == Round::Semifinal));
        assert!(sync.decided.iter().all(|decision| decision.newly_decided));
        assert_eq!(
            sync.decided[8].phase_key.to_string(),
            "2024-05-01T12:00:20Z|qf1"
        );
        assert_eq!(store.winner_count(), 14);

        let again = sync_cycle(&state, now).await.unwrap();
        assert!(again.decided.is_empty());
        assert_eq!(again.clock.version, sync.clock.version);
        assert_eq!(store.winner_count(), 14);
    }

    #[tokio::test]
    async fn full_period_elapsed_resolves_the_final() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 4).await;

        // Several periods later the cyclic checkpoint has wrapped, but the final is still due.
        let sync = sync_cycle(&state, START + 3 * 50_000 + 1_000).await.unwrap();
        assert_eq!(sync.clock.cycle.last_checkpoint, 5);
        assert_eq!(sync.decided.len(), 1);
        assert_eq!(
            sync.decided[0].phase_key.to_string(),
            "2024-05-01T12:00:40Z|final"
        );
        assert!(cycle_complete(&sync.clock));
    }

    #[tokio::test]
    async fn concurrent_catch_up_agrees() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;
        let now = START + 2 * SLICE_MS;

        let (a, b) = tokio::join!(sync_cycle(&state, now), sync_cycle(&state, now));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.clock.cycle.last_checkpoint, 2);
        assert_eq!(b.clock.cycle.last_checkpoint, 2);
        assert_eq!(store.winner_count(), 16 + 8);
        let stored = store.load_clock().await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn paused_cycle_does_not_advance() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;

        apply_cycle_action(&state, TimerAction::Pause, START)
            .await
            .unwrap();
        let sync = sync_cycle(&state, START + 45_000).await.unwrap();
        assert!(sync.clock.cycle.paused());
        assert_eq!(sync.clock.cycle.last_checkpoint, 0);
        assert_eq!(store.winner_count(), 0);

        let resumed = apply_cycle_action(&state, TimerAction::Resume, START + 105_000)
            .await
            .unwrap();
        assert_eq!(resumed.cycle.remaining_ms(START + 105_000), 50_000);
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;

        let paused = apply_cycle_action(&state, TimerAction::Pause, START + 1_000)
            .await
            .unwrap();
        let again = apply_cycle_action(&state, TimerAction::Pause, START + 2_000)
            .await
            .unwrap();
        assert_eq!(again, paused);

        let resumed = apply_cycle_action(&state, TimerAction::Resume, START + 3_000)
            .await
            .unwrap();
        let again = apply_cycle_action(&state, TimerAction::Resume, START + 4_000)
            .await
            .unwrap();
        assert_eq!(again, resumed);
    }

    #[tokio::test]
    async fn reset_starts_new_cycle_and_clears_cache() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 3).await;
        state.bracket_cache().observe_cycle(START);
        state
            .bracket_cache()
            .insert("k".into(), "img/01.png".into());

        let now = START + 61_750;
        let clock = apply_cycle_action(&state, TimerAction::Reset, now)
            .await
            .unwrap();
        assert_eq!(clock.cycle.cycle_start_ms, START + 61_000);
        assert_eq!(clock.cycle.last_checkpoint, 0);
        assert!(state.bracket_cache().is_empty());
    }

    #[tokio::test]
    async fn advance_decides_exactly_one_round() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;

        let clock = apply_cycle_action(&state, TimerAction::Advance, START + 1)
            .await
            .unwrap();
        assert_eq!(clock.cycle.last_checkpoint, 1);
        assert_eq!(clock.cycle.cycle_start_ms, START);
        assert_eq!(store.winner_count(), 16);
    }

    #[tokio::test]
    async fn advance_after_final_is_rejected() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 5).await;

        let err = apply_cycle_action(&state, TimerAction::Advance, START + 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn countdown_resume_preserves_remaining() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;

        let pause_at = START + 43_000;
        apply_countdown_action(&state, TimerAction::Pause, pause_at)
            .await
            .unwrap();
        let resume_at = pause_at + 100_000;
        let clock = apply_countdown_action(&state, TimerAction::Resume, resume_at)
            .await
            .unwrap();
        assert_eq!(clock.countdown.phase_end_at_ms, resume_at + 7_000);
        assert_eq!(clock.countdown.rollovers, 0);
    }

    #[tokio::test]
    async fn countdown_rolls_over_whole_periods() {
        let (state, store) = memory_state(PERIOD_SEC).await;
        seed_clock(&store, 0).await;

        let clock = sync_countdown(&state, START + 125_000).await.unwrap();
        assert_eq!(clock.countdown.rollovers, 2);
        assert_eq!(clock.countdown.phase_end_at_ms, START + 150_000);

        let again = sync_countdown(&state, START + 125_000).await.unwrap();
        assert_eq!(again.version, clock.version);

        let advanced = apply_countdown_action(&state, TimerAction::Advance, START + 130_000)
            .await
            .unwrap();
        assert_eq!(advanced.countdown.rollovers, 3);
        assert_eq!(advanced.countdown.phase_end_at_ms, START + 180_000);
    }
}
