//! Polling client that mirrors the server timer for a single viewer.
//!
//! [`poller::spawn`] runs one scheduled task per view; the latest observed state is
//! published as a [`view::ViewState`] on a watch channel.

use futures::future::BoxFuture;
use thiserror::Error;

pub mod http;
pub mod poller;
pub mod view;

pub use crate::dto::timer::TimerResponse;

/// Failures surfaced while fetching the timer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL could not be turned into an endpoint URL.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    /// Network failure or undecodable body.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },
}

/// Where the poller reads timer snapshots from.
pub trait TimerSource: Send + Sync + 'static {
    /// Fetch the current timer, stage included.
    fn fetch_timer(&self) -> BoxFuture<'static, Result<TimerResponse, ClientError>>;
}
