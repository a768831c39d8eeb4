//! Builds the orchestrator's ports from the configuration file.

use crate::config::{ChainMode, CruiseFile, RecommendationsConfig};
use anyhow::{Context, Result};
use async_trait::async_trait;
use cruise_data::prelude::*;
use cruise_domain::prelude::PoolRecommendation;
use cruise_execution::cruise::{CruisePorts, RecommendationOptimizer};
use cruise_execution::ports::{AgentStateStore, RecommendationSource};
use cruise_protocols::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Recommendations fixed in the configuration file.
#[derive(Debug, Clone)]
pub struct ConfiguredPools(Vec<PoolRecommendation>);

#[async_trait]
impl RecommendationSource for ConfiguredPools {
    async fn recommended_pools(&self) -> anyhow::Result<Vec<PoolRecommendation>> {
        Ok(self.0.clone())
    }
}

fn recommendations(config: &RecommendationsConfig) -> Result<Arc<dyn RecommendationSource>> {
    Ok(match &config.service {
        Some(settings) => Arc::new(HttpRecommendationClient::new(settings.clone())?),
        None => {
            info!(pools = config.pools.len(), "Using recommendations from the config file");
            Arc::new(ConfiguredPools(config.pools.clone()))
        }
    })
}

/// Opens the configured state store, overriding the file with `database_url`.
pub async fn state_store(
    file: &CruiseFile,
    database_url: Option<&str>,
) -> Result<Arc<dyn AgentStateStore>> {
    match database_url.or(file.storage.database_url.as_deref()) {
        Some(url) => {
            let db = Database::connect(url)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Using Postgres state store");
            Ok(Arc::new(db.agent_states()))
        }
        None => Ok(Arc::new(
            JsonFileStateStore::open(file.storage.state_dir.clone()).await?,
        )),
    }
}

/// Builds every port for the configured chain mode.
pub async fn build_ports(file: &CruiseFile, store: Arc<dyn AgentStateStore>) -> Result<CruisePorts> {
    let optimizer = Arc::new(RecommendationOptimizer::new(
        file.service.defaults.default_target_bins,
    ));
    let recommendations = recommendations(&file.recommendations)?;

    let ports = match file.chain.mode {
        ChainMode::Paper => {
            let chain = Arc::new(PaperChain::new().with_usd_price(file.chain.paper_usd_price));
            for entry in &file.agents {
                if !entry.config.initial_investment.is_zero() {
                    chain
                        .fund(&entry.config.wallet_id, entry.config.initial_investment)
                        .await;
                }
            }
            info!(agents = file.agents.len(), "Running against the paper chain");
            CruisePorts {
                wallet: chain.clone(),
                positions: chain.clone(),
                builder: chain.clone(),
                signer: chain.clone(),
                sender: chain,
                recommendations,
                optimizer,
                store,
                metrics: None,
                scorer: None,
            }
        }
        ChainMode::Live => {
            let gateway_settings = file
                .chain
                .gateway
                .clone()
                .context("[chain.gateway] is required in live mode")?;
            let gateway = Arc::new(HttpLpGateway::new(gateway_settings)?);
            let provider = RpcProvider::new(file.chain.rpc.clone());
            let signer = KeypairSigner::load(&file.chain.keypairs).await?;
            info!(url = %file.chain.rpc.url, wallets = ?signer.wallets(), "Running against Solana RPC");
            CruisePorts {
                wallet: Arc::new(SolanaWalletReader::new(provider.clone())),
                positions: gateway.clone(),
                builder: gateway,
                signer: Arc::new(signer),
                sender: Arc::new(SolanaSender::new(provider)),
                recommendations,
                optimizer,
                store,
                metrics: None,
                scorer: None,
            }
        }
    };
    Ok(ports)
}
