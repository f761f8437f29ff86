use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::{
    dto::bracket::{BracketResponse, MatchupResponse, StageResponse},
    error::AppError,
    services::{bracket_service, stage_service},
    state::{SharedState, bracket::Slot, clock::now_ms},
};

/// Read models derived from stored winners.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/stage", get(get_stage))
        .route("/bracket", get(get_bracket))
        .route("/bracket/{slot}", get(get_slot))
}

#[utoipa::path(
    get,
    path = "/stage",
    tag = "bracket",
    responses((status = 200, description = "Round currently open for voting", body = StageResponse))
)]
/// Detect the current stage from winner completeness.
pub async fn get_stage(State(state): State<SharedState>) -> Result<Json<StageResponse>, AppError> {
    let stage = stage_service::current_stage(&state, now_ms()).await?;
    Ok(Json(stage))
}

#[utoipa::path(
    get,
    path = "/bracket",
    tag = "bracket",
    responses((status = 200, description = "Every matchup of the current cycle", body = BracketResponse))
)]
/// Project the whole bracket of the current cycle.
pub async fn get_bracket(
    State(state): State<SharedState>,
) -> Result<Json<BracketResponse>, AppError> {
    let bracket = bracket_service::project_bracket(&state, now_ms()).await?;
    Ok(Json(bracket))
}

#[utoipa::path(
    get,
    path = "/bracket/{slot}",
    tag = "bracket",
    params(("slot" = String, Path, description = "Slot id such as `r32_7`, `qf2` or `final`")),
    responses(
        (status = 200, description = "Projected image pair; `ready` is false while a parent is undecided", body = MatchupResponse),
        (status = 400, description = "Unknown slot")
    )
)]
/// Project the image pair of one slot.
pub async fn get_slot(
    State(state): State<SharedState>,
    Path(slot): Path<String>,
) -> Result<Json<MatchupResponse>, AppError> {
    let slot: Slot = slot.parse()?;
    let matchup = bracket_service::project_slot(&state, slot, now_ms()).await?;
    Ok(Json(matchup))
}
