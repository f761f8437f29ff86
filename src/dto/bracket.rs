use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    services::stage_service::Stage,
    state::bracket::{Color, Round},
};

/// Projected pair of images for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MatchupResponse {
    /// Slot id such as `r32_7`, `qf2` or `final`.
    pub slot: String,
    pub round: Round,
    /// Phase key of this matchup in the current cycle.
    pub phase_key: String,
    /// First image, absent until both parents are decided.
    pub red: Option<String>,
    /// Second image, absent until both parents are decided.
    pub blue: Option<String>,
    /// Whether both images are known.
    pub ready: bool,
    /// Decided color of this matchup, if any.
    pub winner: Option<Color>,
}

/// Every matchup of the current cycle, grouped by round in play order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BracketResponse {
    pub cycle_start: String,
    /// Round id to slot id to matchup.
    #[schema(value_type = Object)]
    pub rounds: IndexMap<Round, IndexMap<String, MatchupResponse>>,
}

/// Result of stage detection for the current cycle.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StageResponse {
    pub cycle_start: String,
    pub stage: Stage,
}
