//! RPC provider shared by the Solana adapters.

use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Public mainnet endpoint used when nothing else is configured.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Connection settings for an RPC endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Status polls before an unseen signature counts as dropped.
    pub confirm_attempts: u32,
    /// Delay between status polls in milliseconds.
    pub confirm_poll_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            timeout_secs: 30,
            confirm_attempts: 30,
            confirm_poll_ms: 1000,
        }
    }
}

/// Thin wrapper around the non-blocking RPC client.
///
/// Cheap to clone; every adapter built from the same provider shares one
/// HTTP connection pool.
#[derive(Clone)]
pub struct RpcProvider {
    client: Arc<RpcClient>,
    config: RpcConfig,
}

impl RpcProvider {
    /// Creates a provider for `config.url`.
    #[must_use]
    pub fn new(config: RpcConfig) -> Self {
        debug!(url = %config.url, "Creating RPC provider");
        let client = RpcClient::new_with_timeout(
            config.url.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        );
        Self {
            client: Arc::new(client),
            config,
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    #[must_use]
    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Delay between confirmation polls.
    #[must_use]
    pub fn confirm_poll(&self) -> Duration {
        Duration::from_millis(self.config.confirm_poll_ms)
    }
}

impl std::fmt::Debug for RpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcProvider")
            .field("url", &self.config.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: RpcConfig =
            serde_json::from_str(r#"{"url": "http://localhost:8899"}"#).unwrap();
        assert_eq!(config.url, "http://localhost:8899");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.confirm_attempts, 30);
    }

    #[test]
    fn test_provider_keeps_config() {
        let provider = RpcProvider::new(RpcConfig {
            confirm_poll_ms: 250,
            ..RpcConfig::default()
        });
        assert_eq!(provider.config().url, DEFAULT_RPC_URL);
        assert_eq!(provider.confirm_poll(), Duration::from_millis(250));
    }
}
