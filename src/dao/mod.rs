/// Persistent record definitions shared by every backend.
pub mod models;
/// Storage error types.
pub mod storage;
/// Tournament storage trait and its backends.
pub mod tournament_store;
