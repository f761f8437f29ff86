use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the bracket backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::public_stream,
        crate::routes::timer::get_timer,
        crate::routes::timer::post_timer,
        crate::routes::timer::get_countdown,
        crate::routes::timer::post_countdown,
        crate::routes::votes::cast_vote,
        crate::routes::votes::get_tally,
        crate::routes::votes::get_winner,
        crate::routes::bracket::get_stage,
        crate::routes::bracket::get_bracket,
        crate::routes::bracket::get_slot,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::timer::TimerAction,
            crate::dto::timer::TimerActionRequest,
            crate::dto::timer::TimerResponse,
            crate::dto::timer::CountdownResponse,
            crate::dto::vote::CastVoteRequest,
            crate::dto::vote::VoteReceipt,
            crate::dto::vote::TallyResponse,
            crate::dto::vote::WinnerResponse,
            crate::dto::bracket::MatchupResponse,
            crate::dto::bracket::BracketResponse,
            crate::dto::bracket::StageResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::CheckpointEvent,
            crate::dto::sse::WinnerDecidedEvent,
            crate::dto::sse::TimerUpdatedEvent,
            crate::services::stage_service::Stage,
            crate::state::bracket::Color,
            crate::state::bracket::Round,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "timer", description = "Phase clock and countdown"),
        (name = "votes", description = "Vote casting and per-matchup results"),
        (name = "bracket", description = "Stage detection and bracket projection"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/public",
            "/timer",
            "/countdown",
            "/votes",
            "/winners",
            "/stage",
            "/bracket",
            "/bracket/{slot}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
