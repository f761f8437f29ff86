//! Library crate for bracket-back, exposing modules for binaries and integration tests.

#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod dao;
mod dto;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
