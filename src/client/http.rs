use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{ClientError, TimerResponse, TimerSource};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`TimerSource`] backed by `GET /timer` on a running server.
#[derive(Clone)]
pub struct HttpTimerSource {
    client: Client,
    timer_url: Url,
}

impl HttpTimerSource {
    /// Build a source for the server rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(client, base_url)
    }

    /// Reuse an existing HTTP client.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ClientError> {
        let mut timer_url = Url::parse(base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        timer_url
            .path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(format!("{base_url}: cannot be a base")))?
            .pop_if_empty()
            .push("timer");
        timer_url
            .query_pairs_mut()
            .append_pair("include_stage", "true");
        Ok(Self { client, timer_url })
    }

    /// Endpoint polled by this source.
    pub fn timer_url(&self) -> &Url {
        &self.timer_url
    }
}

impl TimerSource for HttpTimerSource {
    fn fetch_timer(&self) -> BoxFuture<'static, Result<TimerResponse, ClientError>> {
        let request = self.client.get(self.timer_url.clone());
        Box::pin(async move {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorBody>(&body)
                    .map(|error| error.message)
                    .unwrap_or(body);
                return Err(ClientError::Status {
                    status: status.as_u16(),
                    message,
                });
            }
            Ok(response.json::<TimerResponse>().await?)
        })
    }
}
