use super::{HttpSettings, check_status};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cruise_domain::prelude::PoolRecommendation;
use cruise_execution::ports::RecommendationSource;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

/// Accepted response shapes of `GET /recommendations`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RecommendationsResponse {
    Bare(Vec<PoolRecommendation>),
    Wrapped { pools: Vec<PoolRecommendation> },
}

/// Client for the pool recommendation service.
#[derive(Debug, Clone)]
pub struct HttpRecommendationClient {
    client: Client,
    settings: HttpSettings,
}

impl HttpRecommendationClient {
    /// Creates a client for `settings.base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.client()?,
            settings,
        })
    }
}

#[async_trait]
impl RecommendationSource for HttpRecommendationClient {
    async fn recommended_pools(&self) -> Result<Vec<PoolRecommendation>> {
        let url = self.settings.url("/recommendations");
        debug!(url = %url, "Fetching pool recommendations");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Network error calling {url}"))?;
        let response = check_status(response, "recommendation service").await?;

        let pools = match response
            .json::<RecommendationsResponse>()
            .await
            .context("Failed to parse recommendations")?
        {
            RecommendationsResponse::Bare(pools) | RecommendationsResponse::Wrapped { pools } => {
                pools
            }
        };
        info!(count = pools.len(), "Fetched pool recommendations");
        Ok(pools)
    }
}
