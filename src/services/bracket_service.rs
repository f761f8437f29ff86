//! Projection of seed images through decided matchups.
//!
//! A slot's pair is found by walking winner colors backward to the round-of-32 seeds.
//! Resolved survivors are memoized per cycle in the shared [`BracketCache`](crate::state::BracketCache).

use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::{
    dto::bracket::{BracketResponse, MatchupResponse},
    error::ServiceError,
    services::timer_service,
    state::{
        SharedState,
        bracket::{PhaseKey, Round, Slot, format_instant},
        timer::CycleTimer,
    },
};

fn phase_key(cycle: &CycleTimer, slot: Slot) -> PhaseKey {
    PhaseKey::new(cycle.round_base_ms(slot.round()), slot)
}

/// Image that won `slot` in `cycle`, or `None` while it (or any ancestor) is undecided.
fn survivor<'a>(
    state: &'a SharedState,
    cycle: &'a CycleTimer,
    slot: Slot,
) -> BoxFuture<'a, Result<Option<String>, ServiceError>> {
    Box::pin(async move {
        let key = phase_key(cycle, slot).to_string();
        if let Some(image) = state.bracket_cache().get(&key) {
            return Ok(Some(image));
        }

        let store = state.require_store().await?;
        let Some(winner) = state.store_call(store.find_winner(key.clone())).await? else {
            return Ok(None);
        };
        let Some(pair) = pair_of(state, cycle, slot).await? else {
            return Ok(None);
        };

        let image = winner.color.pick(pair);
        state.bracket_cache().insert(key, image.clone());
        Ok(Some(image))
    })
}

/// The two images meeting in `slot`, or `None` while a parent is undecided.
async fn pair_of(
    state: &SharedState,
    cycle: &CycleTimer,
    slot: Slot,
) -> Result<Option<(String, String)>, ServiceError> {
    if let Some((first, second)) = slot.seed_indices() {
        let seeds = state.config().seeds();
        return Ok(seeds
            .get(first)
            .cloned()
            .zip(seeds.get(second).cloned()));
    }

    let Some((left, right)) = slot.parents() else {
        return Ok(None);
    };
    let (left, right) = tokio::try_join!(
        survivor(state, cycle, left),
        survivor(state, cycle, right)
    )?;
    Ok(left.zip(right))
}

async fn matchup(
    state: &SharedState,
    cycle: &CycleTimer,
    slot: Slot,
) -> Result<MatchupResponse, ServiceError> {
    let key = phase_key(cycle, slot);
    let store = state.require_store().await?;
    let (pair, winner) = tokio::try_join!(
        pair_of(state, cycle, slot),
        state.store_call(store.find_winner(key.to_string()))
    )?;
    let (red, blue) = match pair {
        Some((red, blue)) => (Some(red), Some(blue)),
        None => (None, None),
    };

    Ok(MatchupResponse {
        slot: slot.to_string(),
        round: slot.round(),
        phase_key: key.to_string(),
        ready: red.is_some() && blue.is_some(),
        red,
        blue,
        winner: winner.map(|record| record.color),
    })
}

/// Project one slot of the current cycle.
pub async fn project_slot(
    state: &SharedState,
    slot: Slot,
    now_ms: i64,
) -> Result<MatchupResponse, ServiceError> {
    let sync = timer_service::sync_cycle(state, now_ms).await?;
    matchup(state, &sync.clock.cycle, slot).await
}

/// Project every slot of the current cycle, grouped by round in play order.
pub async fn project_bracket(state: &SharedState, now_ms: i64) -> Result<BracketResponse, ServiceError> {
    let sync = timer_service::sync_cycle(state, now_ms).await?;
    let cycle = &sync.clock.cycle;

    let mut rounds = IndexMap::new();
    for round in Round::ALL {
        let mut matchups = IndexMap::new();
        for slot in round.slots() {
            matchups.insert(slot.to_string(), matchup(state, cycle, slot).await?);
        }
        rounds.insert(round, matchups);
    }

    Ok(BracketResponse {
        cycle_start: format_instant(cycle.cycle_start_ms),
        rounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{
            models::{ClockEntity, WinnerEntity},
            tournament_store::{TournamentStore, memory::MemoryTournamentStore},
        },
        state::{bracket::Color, test_support::memory_state},
    };

    const START: i64 = 1_714_564_800_000;
    const NOW: i64 = START + 1;

    fn slot(id: &str) -> Slot {
        id.parse().unwrap()
    }

    async fn decide(store: &MemoryTournamentStore, cycle: &CycleTimer, id: &str, color: Color) {
        store
            .insert_winner(WinnerEntity {
                phase_key: phase_key(cycle, slot(id)).to_string(),
                color,
                decided_at_ms: START,
            })
            .await
            .unwrap();
    }

    async fn seeded() -> (SharedState, MemoryTournamentStore, CycleTimer) {
        let (state, store) = memory_state(50).await;
        let clock = store
            .init_clock(ClockEntity::initial(START, 50))
            .await
            .unwrap();
        (state, store, clock.cycle)
    }

    #[tokio::test]
    async fn first_round_shows_fixed_seeds() {
        let (state, _store, _cycle) = seeded().await;
        let matchup = project_slot(&state, slot("r32_16"), NOW).await.unwrap();
        assert_eq!(matchup.red.as_deref(), Some("img/31.png"));
        assert_eq!(matchup.blue.as_deref(), Some("img/32.png"));
        assert!(matchup.ready);
        assert_eq!(matchup.winner, None);
        assert_eq!(matchup.phase_key, "2024-05-01T12:00:00Z|r32_16");
    }

    #[tokio::test]
    async fn winners_propagate_into_next_round() {
        let (state, store, cycle) = seeded().await;
        decide(&store, &cycle, "r32_1", Color::Blue).await;
        decide(&store, &cycle, "r32_2", Color::Red).await;

        let matchup = project_slot(&state, slot("r16_1"), NOW).await.unwrap();
        assert_eq!(matchup.red.as_deref(), Some("img/02.png"));
        assert_eq!(matchup.blue.as_deref(), Some("img/03.png"));
        assert!(matchup.ready);
        assert_eq!(matchup.phase_key, "2024-05-01T12:00:10Z|r16_1");
        assert_eq!(state.bracket_cache().len(), 2);
    }

    #[tokio::test]
    async fn missing_ancestor_is_not_ready() {
        let (state, store, cycle) = seeded().await;
        decide(&store, &cycle, "r32_1", Color::Blue).await;

        let matchup = project_slot(&state, slot("r16_1"), NOW).await.unwrap();
        assert!(!matchup.ready);
        assert_eq!(matchup.red, None);
        assert_eq!(matchup.blue, None);

        let final_matchup = project_slot(&state, slot("final"), NOW).await.unwrap();
        assert!(!final_matchup.ready);
    }

    #[tokio::test]
    async fn whole_bracket_is_grouped_by_round() {
        let (state, store, cycle) = seeded().await;
        decide(&store, &cycle, "r32_1", Color::Red).await;

        let bracket = project_bracket(&state, NOW).await.unwrap();
        assert_eq!(bracket.cycle_start, "2024-05-01T12:00:00Z");
        let counts: Vec<usize> = bracket.rounds.values().map(IndexMap::len).collect();
        assert_eq!(counts, vec![16, 8, 4, 2, 1]);
        let r32 = &bracket.rounds[&Round::RoundOf32];
        assert_eq!(r32.get_index(0).map(|(id, _)| id.as_str()), Some("r32_1"));
        assert_eq!(r32["r32_1"].winner, Some(Color::Red));
    }
}
