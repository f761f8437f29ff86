//! Pull-based detection of the round currently being played.
//!
//! The stage is derived from winner completeness alone, so a client that reconnects
//! mid-cycle converges without having seen any checkpoint event.

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    dto::bracket::StageResponse,
    error::ServiceError,
    services::timer_service,
    state::{SharedState, bracket::{Round, format_instant}, timer::CycleTimer},
};

/// Round currently open for voting, or `complete` once the final is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Stage {
    #[serde(rename = "r32")]
    RoundOf32,
    #[serde(rename = "r16")]
    RoundOf16,
    #[serde(rename = "qf")]
    Quarterfinal,
    #[serde(rename = "sf")]
    Semifinal,
    #[serde(rename = "final")]
    Final,
    #[serde(rename = "complete")]
    Complete,
}

impl Stage {
    /// Round open for voting, `None` once complete.
    pub fn round(self) -> Option<Round> {
        match self {
            Stage::RoundOf32 => Some(Round::RoundOf32),
            Stage::RoundOf16 => Some(Round::RoundOf16),
            Stage::Quarterfinal => Some(Round::Quarterfinal),
            Stage::Semifinal => Some(Round::Semifinal),
            Stage::Final => Some(Round::Final),
            Stage::Complete => None,
        }
    }
}

impl From<Round> for Stage {
    fn from(round: Round) -> Self {
        match round {
            Round::RoundOf32 => Stage::RoundOf32,
            Round::RoundOf16 => Stage::RoundOf16,
            Round::Quarterfinal => Stage::Quarterfinal,
            Round::Semifinal => Stage::Semifinal,
            Round::Final => Stage::Final,
        }
    }
}

/// Whether every matchup of `round` has a stored winner.
async fn round_decided(
    state: &SharedState,
    cycle: &CycleTimer,
    round: Round,
) -> Result<bool, ServiceError> {
    let store = state.require_store().await?;
    let lookups = cycle
        .round_keys(round)
        .into_iter()
        .map(|key| state.store_call(store.find_winner(key.to_string())));
    let winners = try_join_all(lookups).await?;
    Ok(winners.iter().all(Option::is_some))
}

/// The earliest round, in play order, that is not fully decided; `complete` when none is.
pub async fn detect_stage(state: &SharedState, cycle: &CycleTimer) -> Result<Stage, ServiceError> {
    for round in Round::ALL {
        if !round_decided(state, cycle, round).await? {
            return Ok(Stage::from(round));
        }
    }
    Ok(Stage::Complete)
}

/// Catch up, then detect the stage of the current cycle.
pub async fn current_stage(state: &SharedState, now_ms: i64) -> Result<StageResponse, ServiceError> {
    let sync = timer_service::sync_cycle(state, now_ms).await?;
    let stage = detect_stage(state, &sync.clock.cycle).await?;
    Ok(StageResponse {
        cycle_start: format_instant(sync.clock.cycle.cycle_start_ms),
        stage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::{models::WinnerEntity, tournament_store::TournamentStore},
        state::{bracket::Color, test_support::memory_state},
    };

    const START: i64 = 1_714_564_800_000;

    async fn decide_all(store: &impl TournamentStore, cycle: &CycleTimer, round: Round) {
        for key in cycle.round_keys(round) {
            store
                .insert_winner(WinnerEntity {
                    phase_key: key.to_string(),
                    color: Color::Red,
                    decided_at_ms: START,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn nothing_decided_means_round_of_32() {
        let (state, _store) = memory_state(50).await;
        let cycle = CycleTimer::start(START, 50);
        assert_eq!(detect_stage(&state, &cycle).await.unwrap(), Stage::RoundOf32);
    }

    #[tokio::test]
    async fn decided_round_of_32_opens_round_of_16() {
        let (state, store) = memory_state(50).await;
        let cycle = CycleTimer::start(START, 50);
        decide_all(&store, &cycle, Round::RoundOf32).await;
        assert_eq!(detect_stage(&state, &cycle).await.unwrap(), Stage::RoundOf16);
    }

    #[tokio::test]
    async fn partially_decided_round_does_not_count() {
        let (state, store) = memory_state(50).await;
        let cycle = CycleTimer::start(START, 50);
        decide_all(&store, &cycle, Round::RoundOf32).await;
        let first_r16 = cycle.round_keys(Round::RoundOf16)[0];
        store
            .insert_winner(WinnerEntity {
                phase_key: first_r16.to_string(),
                color: Color::Blue,
                decided_at_ms: START,
            })
            .await
            .unwrap();
        assert_eq!(detect_stage(&state, &cycle).await.unwrap(), Stage::RoundOf16);
    }

    #[tokio::test]
    async fn earliest_undecided_round_wins_over_later_ones() {
        let (state, store) = memory_state(50).await;
        let cycle = CycleTimer::start(START, 50);
        decide_all(&store, &cycle, Round::RoundOf32).await;
        decide_all(&store, &cycle, Round::Quarterfinal).await;
        assert_eq!(detect_stage(&state, &cycle).await.unwrap(), Stage::RoundOf16);
    }

    #[tokio::test]
    async fn winners_from_another_cycle_are_ignored() {
        let (state, store) = memory_state(50).await;
        let previous = CycleTimer::start(START, 50);
        for round in Round::ALL {
            decide_all(&store, &previous, round).await;
        }
        assert_eq!(detect_stage(&state, &previous).await.unwrap(), Stage::Complete);

        let current = CycleTimer::start(START + 120_000, 50);
        assert_eq!(detect_stage(&state, &current).await.unwrap(), Stage::RoundOf32);
    }

    #[test]
    fn stage_serializes_as_round_id() {
        assert_eq!(serde_json::to_value(Stage::Quarterfinal).unwrap(), "qf");
        assert_eq!(serde_json::to_value(Stage::Complete).unwrap(), "complete");
        assert_eq!(Stage::RoundOf16.round(), Some(Round::RoundOf16));
    }
}
