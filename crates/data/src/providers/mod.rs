//! HTTP clients for the external collaborators.
//!
//! - Recommendation service: ranked pools with health scores
//! - LP gateway: position reads and unsigned transaction building

mod gateway;
mod recommendations;

pub use gateway::HttpLpGateway;
pub use recommendations::HttpRecommendationClient;

use anyhow::{Context, Result, bail};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Endpoint settings shared by the HTTP clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Base URL, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl HttpSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    fn client(&self) -> Result<Client> {
        Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs.max(1)))
            .build()
            .context("Failed to build HTTP client")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

/// Turns a non-2xx response into an error carrying the body.
async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{what} returned {status}: {body}")
}
