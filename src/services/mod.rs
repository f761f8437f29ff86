/// Image projection through decided matchups.
pub mod bracket_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Winner decisions for ended phases.
pub mod resolver;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Stage detection from winner completeness.
pub mod stage_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Phase clock catch-up and timer controls.
pub mod timer_service;
/// Vote casting and per-matchup reads.
pub mod vote_service;
