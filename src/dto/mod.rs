pub mod bracket;
pub mod health;
pub mod sse;
pub mod timer;
pub mod validation;
pub mod vote;
