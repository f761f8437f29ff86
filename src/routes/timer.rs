use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::timer::{CountdownResponse, TimerActionRequest, TimerQuery, TimerResponse},
    error::AppError,
    services::timer_service,
    state::{SharedState, clock::now_ms},
};

/// Routes exposing the checkpoint timer and the coarse countdown.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/timer", get(get_timer).post(post_timer))
        .route("/countdown", get(get_countdown).post(post_countdown))
}

#[utoipa::path(
    get,
    path = "/timer",
    tag = "timer",
    params(TimerQuery),
    responses(
        (status = 200, description = "Timer after catch-up", body = TimerResponse),
        (status = 503, description = "Store unavailable or slow; retry on next poll")
    )
)]
/// Resolve every due checkpoint, then return the checkpoint timer.
pub async fn get_timer(
    State(state): State<SharedState>,
    Query(query): Query<TimerQuery>,
) -> Result<Json<TimerResponse>, AppError> {
    let view = timer_service::timer_view(&state, query.include_stage, now_ms()).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/timer",
    tag = "timer",
    request_body = TimerActionRequest,
    responses(
        (status = 200, description = "Timer after the action", body = TimerResponse),
        (status = 409, description = "Action not possible in the current cycle"),
        (status = 503, description = "Store unavailable or contended")
    )
)]
/// Pause, resume, reset or advance the checkpoint timer.
pub async fn post_timer(
    State(state): State<SharedState>,
    Json(payload): Json<TimerActionRequest>,
) -> Result<Json<TimerResponse>, AppError> {
    let now = now_ms();
    let clock = timer_service::apply_cycle_action(&state, payload.action, now).await?;
    Ok(Json(TimerResponse::from_clock(&clock, now)))
}

#[utoipa::path(
    get,
    path = "/countdown",
    tag = "timer",
    responses(
        (status = 200, description = "Countdown after rollover catch-up", body = CountdownResponse),
        (status = 503, description = "Store unavailable or slow; retry on next poll")
    )
)]
/// Roll the countdown forward, then return it.
pub async fn get_countdown(
    State(state): State<SharedState>,
) -> Result<Json<CountdownResponse>, AppError> {
    let view = timer_service::countdown_view(&state, now_ms()).await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/countdown",
    tag = "timer",
    request_body = TimerActionRequest,
    responses(
        (status = 200, description = "Countdown after the action", body = CountdownResponse),
        (status = 503, description = "Store unavailable or contended")
    )
)]
/// Pause, resume, reset or advance the countdown.
pub async fn post_countdown(
    State(state): State<SharedState>,
    Json(payload): Json<TimerActionRequest>,
) -> Result<Json<CountdownResponse>, AppError> {
    let now = now_ms();
    let clock = timer_service::apply_countdown_action(&state, payload.action, now).await?;
    Ok(Json(CountdownResponse::from_clock(&clock, now)))
}
