//! Ports to the collaborators the engine depends on.
//!
//! Chain access, recommendations, optimization plans, persistence and
//! metrics are all injected through these traits; the engine never talks
//! to a chain SDK or database directly.

use async_trait::async_trait;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use std::time::Duration;

/// Reads the native balance of a wallet.
#[async_trait]
pub trait WalletReader: Send + Sync {
    /// Returns the available native balance of `wallet_id`.
    async fn balance(&self, wallet_id: &str) -> anyhow::Result<Decimal>;
}

/// Reads the open LP positions of a wallet.
#[async_trait]
pub trait PositionReader: Send + Sync {
    /// Returns every open position held by `wallet_id`.
    async fn positions(&self, wallet_id: &str) -> anyhow::Result<Vec<PositionValue>>;
}

/// Builds unsigned transactions, one method per transaction type.
#[async_trait]
pub trait TransactionBuilder: Send + Sync {
    async fn build_add_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        amount: Decimal,
        target_bins: u32,
    ) -> anyhow::Result<UnsignedTransaction>;

    async fn build_remove_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        fraction: Decimal,
    ) -> anyhow::Result<UnsignedTransaction>;

    async fn build_swap(
        &self,
        wallet_id: &str,
        input_mint: &str,
        output_mint: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> anyhow::Result<UnsignedTransaction>;

    async fn build_emergency_exit(
        &self,
        wallet_id: &str,
        pool_ids: &[String],
    ) -> anyhow::Result<UnsignedTransaction>;
}

/// Signs transactions with the key bound to a wallet.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(
        &self,
        wallet_id: &str,
        transaction: UnsignedTransaction,
    ) -> anyhow::Result<SignedTransaction>;
}

/// Broadcasts signed transactions and checks their confirmation.
#[async_trait]
pub trait TransactionSender: Send + Sync {
    /// Broadcasts the transaction, returning its signature.
    async fn send(&self, transaction: &SignedTransaction) -> anyhow::Result<String>;

    /// Returns `true` once the transaction is confirmed, `false` if it
    /// landed with an error or was dropped.
    async fn confirm(&self, signature: &str) -> anyhow::Result<bool>;
}

/// Ranked pools produced by the recommendation service.
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn recommended_pools(&self) -> anyhow::Result<Vec<PoolRecommendation>>;
}

/// Decides which positions are unhealthy and what to do about them.
#[async_trait]
pub trait PositionOptimizer: Send + Sync {
    /// Pool ids of positions that should be reworked.
    async fn unhealthy_positions(
        &self,
        config: &AgentConfig,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> anyhow::Result<Vec<String>>;

    /// Ordered plan of actions for the agent.
    async fn plan(
        &self,
        config: &AgentConfig,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> anyhow::Result<Vec<OptimizationAction>>;
}

/// Durable keyed storage of agent snapshots.
#[async_trait]
pub trait AgentStateStore: Send + Sync {
    async fn save(&self, status: &AgentStatus) -> anyhow::Result<()>;

    /// Returns `Ok(None)` when nothing was saved for `agent_id`.
    async fn load(&self, agent_id: &str) -> anyhow::Result<Option<AgentStatus>>;

    async fn delete(&self, agent_id: &str) -> anyhow::Result<()>;
}

/// Write-only sink for run metrics.
pub trait MetricsSink: Send + Sync {
    fn record_health_check(&self, agent_id: &str, duration: Duration, success: bool);

    fn record_optimization(
        &self,
        agent_id: &str,
        duration: Duration,
        planned: usize,
        succeeded: usize,
    );
}
