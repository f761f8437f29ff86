use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{TallyEntity, WinnerEntity},
    dto::validation::validate_phase_key,
    state::bracket::Color,
};

/// Body of `POST /votes`.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CastVoteRequest {
    /// Matchup being voted on.
    #[validate(custom(function = "validate_phase_key"))]
    pub phase_key: String,
    /// Identity issued by the session provider.
    pub voter_id: Uuid,
    pub color: Color,
}

/// Acknowledgement of a stored vote.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoteReceipt {
    pub phase_key: String,
    pub voter_id: Uuid,
    pub color: Color,
    /// Server time the vote was recorded at (RFC 3339).
    pub cast_at: String,
}

/// Query string shared by `GET /votes` and `GET /winners`.
#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PhaseKeyQuery {
    #[validate(custom(function = "validate_phase_key"))]
    pub phase_key: String,
}

/// Vote counts of one matchup.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TallyResponse {
    pub phase_key: String,
    pub red: u64,
    pub blue: u64,
}

impl TallyResponse {
    /// Pair a tally with the key it was counted for.
    pub fn new(phase_key: String, tally: TallyEntity) -> Self {
        Self {
            phase_key,
            red: tally.red,
            blue: tally.blue,
        }
    }
}

/// Decided color of one matchup, `null` while undecided.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WinnerResponse {
    pub phase_key: String,
    pub color: Option<Color>,
}

impl WinnerResponse {
    /// Build from an optional stored record.
    pub fn new(phase_key: String, winner: Option<WinnerEntity>) -> Self {
        Self {
            phase_key,
            color: winner.map(|record| record.color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_request_validates_phase_key() {
        let valid = CastVoteRequest {
            phase_key: "2024-05-01T12:00:00Z|sf2".into(),
            voter_id: Uuid::new_v4(),
            color: Color::Blue,
        };
        assert!(valid.validate().is_ok());

        let invalid = CastVoteRequest {
            phase_key: "sf2".into(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn vote_request_rejects_unknown_color() {
        let raw = r#"{"phase_key":"2024-05-01T12:00:00Z|sf2","voter_id":"67e55044-10b1-426f-9247-bb680e5fe0c8","color":"green"}"#;
        assert!(serde_json::from_str::<CastVoteRequest>(raw).is_err());
    }
}
