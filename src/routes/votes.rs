use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::vote::{CastVoteRequest, PhaseKeyQuery, TallyResponse, VoteReceipt, WinnerResponse},
    error::AppError,
    services::vote_service,
    state::SharedState,
};

/// Routes for casting votes and reading per-matchup results.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/votes", get(get_tally).post(cast_vote))
        .route("/winners", get(get_winner))
}

#[utoipa::path(
    post,
    path = "/votes",
    tag = "votes",
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote stored", body = VoteReceipt),
        (status = 400, description = "Malformed phase key or body")
    )
)]
/// Record a vote; a later vote by the same voter for the same matchup replaces it.
pub async fn cast_vote(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CastVoteRequest>>,
) -> Result<Json<VoteReceipt>, AppError> {
    let receipt = vote_service::cast_vote(&state, payload).await?;
    Ok(Json(receipt))
}

#[utoipa::path(
    get,
    path = "/votes",
    tag = "votes",
    params(PhaseKeyQuery),
    responses((status = 200, description = "Vote counts", body = TallyResponse))
)]
/// Return vote counts for one matchup.
pub async fn get_tally(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<PhaseKeyQuery>>,
) -> Result<Json<TallyResponse>, AppError> {
    let tally = vote_service::tally(&state, &query.phase_key).await?;
    Ok(Json(tally))
}

#[utoipa::path(
    get,
    path = "/winners",
    tag = "votes",
    params(PhaseKeyQuery),
    responses((status = 200, description = "Decided color, null while undecided", body = WinnerResponse))
)]
/// Return the decided color of one matchup.
pub async fn get_winner(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<PhaseKeyQuery>>,
) -> Result<Json<WinnerResponse>, AppError> {
    let winner = vote_service::winner(&state, &query.phase_key).await?;
    Ok(Json(winner))
}
