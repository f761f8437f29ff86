use tracing::debug;

use crate::{
    dao::models::VoteEntity,
    dto::vote::{CastVoteRequest, TallyResponse, VoteReceipt, WinnerResponse},
    error::ServiceError,
    state::{
        SharedState,
        bracket::{PhaseKey, format_instant},
        clock::now_ms,
    },
};

/// Record a vote, overwriting any earlier vote by the same voter for the same matchup.
pub async fn cast_vote(
    state: &SharedState,
    request: CastVoteRequest,
) -> Result<VoteReceipt, ServiceError> {
    let phase_key: PhaseKey = request.phase_key.parse()?;
    let store = state.require_store().await?;
    let cast_at_ms = now_ms();

    let vote = VoteEntity {
        phase_key: phase_key.to_string(),
        voter_id: request.voter_id,
        color: request.color,
        cast_at_ms,
    };
    state.store_call(store.upsert_vote(vote)).await?;
    debug!(%phase_key, voter_id = %request.voter_id, color = ?request.color, "vote recorded");

    Ok(VoteReceipt {
        phase_key: phase_key.to_string(),
        voter_id: request.voter_id,
        color: request.color,
        cast_at: format_instant(cast_at_ms),
    })
}

/// Current vote counts for one matchup.
pub async fn tally(state: &SharedState, phase_key: &str) -> Result<TallyResponse, ServiceError> {
    let phase_key: PhaseKey = phase_key.parse()?;
    let store = state.require_store().await?;
    let key = phase_key.to_string();
    let tally = state.store_call(store.tally_votes(key.clone())).await?;
    Ok(TallyResponse::new(key, tally))
}

/// Decided color of one matchup, if any.
pub async fn winner(state: &SharedState, phase_key: &str) -> Result<WinnerResponse, ServiceError> {
    let phase_key: PhaseKey = phase_key.parse()?;
    let store = state.require_store().await?;
    let key = phase_key.to_string();
    let winner = state.store_call(store.find_winner(key.clone())).await?;
    Ok(WinnerResponse::new(key, winner))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::state::{bracket::Color, test_support::memory_state};

    const KEY: &str = "2024-05-01T12:00:00Z|r32_4";

    #[tokio::test]
    async fn last_vote_per_voter_counts() {
        let (state, _store) = memory_state(50).await;
        let voter = Uuid::new_v4();
        for color in [Color::Red, Color::Blue] {
            cast_vote(
                &state,
                CastVoteRequest {
                    phase_key: KEY.into(),
                    voter_id: voter,
                    color,
                },
            )
            .await
            .unwrap();
        }
        cast_vote(
            &state,
            CastVoteRequest {
                phase_key: KEY.into(),
                voter_id: Uuid::new_v4(),
                color: Color::Blue,
            },
        )
        .await
        .unwrap();

        let tally = tally(&state, KEY).await.unwrap();
        assert_eq!((tally.red, tally.blue), (0, 2));
        assert_eq!(winner(&state, KEY).await.unwrap().color, None);
    }

    #[tokio::test]
    async fn malformed_key_is_invalid_input() {
        let (state, _store) = memory_state(50).await;
        let err = tally(&state, "r32_4").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
