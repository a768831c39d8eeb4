//! Configuration file loading.
//!
//! ```toml
//! [service.defaults]
//! health_check_interval_secs = 1800
//!
//! [chain]
//! mode = "paper"
//!
//! [storage]
//! state_dir = "./state"
//!
//! [api]
//! bind_addr = "127.0.0.1:8080"
//!
//! [[agents]]
//! id = "sol-usdc"
//! wallet_id = "7xKX..."
//! max_positions = 3
//! ```

use anyhow::{Context, Result, bail};
use cruise_api::ServerConfig;
use cruise_data::providers::HttpSettings;
use cruise_domain::prelude::{AgentConfig, PoolRecommendation};
use cruise_execution::cruise::CruiseSettings;
use cruise_protocols::rpc::RpcConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Where transactions go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// Simulated fills against in-memory balances.
    #[default]
    Paper,
    /// Solana RPC with keypair signing.
    Live,
}

/// `[chain]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub mode: ChainMode,
    pub rpc: RpcConfig,
    /// Keypair files of the wallets agents trade from.
    pub keypairs: Vec<PathBuf>,
    /// LP gateway that reads positions and builds transactions.
    pub gateway: Option<HttpSettings>,
    /// USD price used to value paper positions.
    pub paper_usd_price: Decimal,
}

/// `[storage]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Postgres URL; takes precedence over `state_dir`.
    pub database_url: Option<String>,
    /// Directory for JSON snapshots.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            state_dir: PathBuf::from("./state"),
        }
    }
}

/// `[recommendations]` section: a service URL or a fixed pool list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RecommendationsConfig {
    pub service: Option<HttpSettings>,
    pub pools: Vec<PoolRecommendation>,
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(flatten)]
    pub config: AgentConfig,
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CruiseFile {
    pub service: CruiseSettings,
    pub chain: ChainConfig,
    pub storage: StorageConfig,
    pub api: ServerConfig,
    pub recommendations: RecommendationsConfig,
    pub agents: Vec<AgentEntry>,
}

impl CruiseFile {
    /// Parses a TOML document.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut file: Self = toml::from_str(raw).context("invalid configuration file")?;
        for entry in &mut file.agents {
            if entry.config.name.is_empty() {
                entry.config.name = entry.id.clone();
            }
        }
        file.check()?;
        Ok(file)
    }

    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in {}", path.display()))
    }

    fn check(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.agents {
            if !seen.insert(entry.id.as_str()) {
                bail!("agent id {} is listed twice", entry.id);
            }
        }
        if self.chain.mode == ChainMode::Live && self.chain.gateway.is_none() {
            bail!("[chain.gateway] is required in live mode");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cruise_domain::prelude::RiskTolerance;
    use rust_decimal_macros::dec;

    #[test]
    fn test_minimal_file_only_lists_agents() {
        let file = CruiseFile::parse(
            r#"
            [[agents]]
            id = "alpha"
            wallet_id = "wallet-a"
            "#,
        )
        .unwrap();

        assert_eq!(file.chain.mode, ChainMode::Paper);
        assert_eq!(file.storage.state_dir, PathBuf::from("./state"));
        assert_eq!(file.service.defaults.health_check_interval_secs, 1800);
        assert_eq!(file.agents[0].config.name, "alpha");
        assert_eq!(file.agents[0].config.max_positions, 3);
    }

    #[test]
    fn test_full_file() {
        let file = CruiseFile::parse(
            r#"
            [service.defaults]
            market_check_interval_secs = 60

            [service.executor]
            backoff_secs = [1, 2, 4]
            max_retries = 3

            [chain]
            mode = "live"
            keypairs = ["/keys/a.json"]

            [chain.rpc]
            url = "http://localhost:8899"

            [chain.gateway]
            base_url = "http://gateway:9000"

            [storage]
            database_url = "postgres://cruise@localhost/cruise"

            [api]
            bind_addr = "0.0.0.0:8081"

            [[recommendations.pools]]
            pool_id = "pool-a"
            health_score = 4.2

            [[agents]]
            id = "alpha"
            name = "Alpha"
            wallet_id = "wallet-a"
            max_positions = 2
            min_balance = 0.25
            risk_tolerance = "aggressive"
            health_check_interval_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(file.service.defaults.market_check_interval_secs, 60);
        assert_eq!(file.service.executor.backoff_secs, vec![1, 2, 4]);
        assert_eq!(file.chain.rpc.url, "http://localhost:8899");
        assert_eq!(file.chain.keypairs, vec![PathBuf::from("/keys/a.json")]);
        assert_eq!(file.api.bind_addr, "0.0.0.0:8081");
        assert_eq!(file.recommendations.pools[0].health_score, dec!(4.2));

        let alpha = &file.agents[0].config;
        assert_eq!(alpha.name, "Alpha");
        assert_eq!(alpha.min_balance, dec!(0.25));
        assert_eq!(alpha.risk_tolerance, RiskTolerance::Aggressive);
        assert_eq!(alpha.health_check_interval_secs, Some(600));
    }

    #[test]
    fn test_rejects_duplicate_ids_and_live_without_gateway() {
        let duplicate = r#"
            [[agents]]
            id = "a"
            wallet_id = "w"
            [[agents]]
            id = "a"
            wallet_id = "w"
        "#;
        assert!(CruiseFile::parse(duplicate).is_err());
        assert!(CruiseFile::parse("[chain]\nmode = \"live\"").is_err());
    }
}
