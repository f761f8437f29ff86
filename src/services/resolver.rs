//! Winner decisions for matchups whose phase has ended.
//!
//! A decision is written once per phase key. Every caller, redundant or concurrent, reads
//! back the stored record so all of them report the same color.

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::{
    dao::models::{TallyEntity, WinnerEntity},
    error::ServiceError,
    services::sse_events,
    state::{
        SharedState,
        bracket::{Color, PhaseKey, Round},
        clock::now_ms,
    },
};

/// Outcome of deciding one matchup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub phase_key: PhaseKey,
    /// Stored winning color.
    pub color: Color,
    /// Whether this call wrote the record.
    pub newly_decided: bool,
}

/// Pick the color with more votes, deferring to `coin` on a tie.
pub fn resolve_color(tally: TallyEntity, coin: impl FnOnce() -> Color) -> Color {
    match tally.red.cmp(&tally.blue) {
        std::cmp::Ordering::Greater => Color::Red,
        std::cmp::Ordering::Less => Color::Blue,
        std::cmp::Ordering::Equal => coin(),
    }
}

/// Uniformly random color.
pub fn coin_flip() -> Color {
    if rand::random::<bool>() {
        Color::Red
    } else {
        Color::Blue
    }
}

/// Decide one matchup, leaving an existing decision untouched.
pub async fn decide_key(state: &SharedState, phase_key: PhaseKey) -> Result<Decision, ServiceError> {
    let store = state.require_store().await?;
    let key = phase_key.to_string();

    if let Some(existing) = state.store_call(store.find_winner(key.clone())).await? {
        return Ok(Decision {
            phase_key,
            color: existing.color,
            newly_decided: false,
        });
    }

    let tally = state.store_call(store.tally_votes(key.clone())).await?;
    let color = resolve_color(tally, coin_flip);
    let candidate = WinnerEntity {
        phase_key: key,
        color,
        decided_at_ms: now_ms(),
    };

    let outcome = state.store_call(store.insert_winner(candidate)).await?;
    let newly_decided = outcome.inserted();
    let record = outcome.into_record();

    if newly_decided {
        info!(
            phase_key = %record.phase_key,
            color = ?record.color,
            red = tally.red,
            blue = tally.blue,
            "matchup decided"
        );
        sse_events::broadcast_winner_decided(state, &record);
    } else {
        debug!(phase_key = %record.phase_key, "matchup already decided by another caller");
    }

    Ok(Decision {
        phase_key,
        color: record.color,
        newly_decided,
    })
}

/// Decide every matchup of `round` whose keys use `base_ms`.
pub async fn decide_round(
    state: &SharedState,
    base_ms: i64,
    round: Round,
) -> Result<Vec<Decision>, ServiceError> {
    let decisions = round
        .slots()
        .map(|slot| decide_key(state, PhaseKey::new(base_ms, slot)));
    try_join_all(decisions).await
}
