//! In-memory doubles for the engine ports.
//!
//! Compiled for this crate's tests and, behind the `testkit` feature, for
//! downstream crates that need a working engine without a chain or database.

use crate::ports::{
    AgentStateStore, PositionReader, RecommendationSource, TransactionBuilder, TransactionSender,
    TransactionSigner, WalletReader,
};
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Agent snapshots kept in a map.
#[derive(Default)]
pub struct InMemoryStateStore {
    snapshots: RwLock<HashMap<String, AgentStatus>>,
    fail_writes: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `save` fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self, agent_id: &str) -> Option<AgentStatus> {
        self.snapshots.read().await.get(agent_id).cloned()
    }

    pub async fn insert(&self, status: AgentStatus) {
        self.snapshots
            .write()
            .await
            .insert(status.agent_id.clone(), status);
    }
}

#[async_trait]
impl AgentStateStore for InMemoryStateStore {
    async fn save(&self, status: &AgentStatus) -> anyhow::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("state store unavailable");
        }
        self.insert(status.clone()).await;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> anyhow::Result<Option<AgentStatus>> {
        Ok(self.snapshot(agent_id).await)
    }

    async fn delete(&self, agent_id: &str) -> anyhow::Result<()> {
        self.snapshots.write().await.remove(agent_id);
        Ok(())
    }
}

/// A chain whose balances are set by the test and whose failures are
/// scripted by count.
#[derive(Default)]
pub struct MockChain {
    balances: RwLock<HashMap<String, Decimal>>,
    positions: RwLock<HashMap<String, Vec<PositionValue>>>,
    built: RwLock<Vec<TransactionPayload>>,
    fail_reads: AtomicBool,
    build_failures: AtomicU32,
    sign_failures: AtomicU32,
    send_failures: AtomicU32,
    unconfirmed: AtomicU32,
    reads: AtomicUsize,
    sends: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, wallet_id: &str, balance: Decimal) {
        self.balances
            .write()
            .await
            .insert(wallet_id.to_string(), balance);
    }

    pub async fn set_positions(&self, wallet_id: &str, positions: Vec<PositionValue>) {
        self.positions
            .write()
            .await
            .insert(wallet_id.to_string(), positions);
    }

    /// Makes balance and position reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// The next `count` builds fail.
    pub fn fail_next_builds(&self, count: u32) {
        self.build_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` signing requests fail.
    pub fn fail_next_signs(&self, count: u32) {
        self.sign_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` sends fail with an RPC error.
    pub fn fail_next_sends(&self, count: u32) {
        self.send_failures.store(count, Ordering::SeqCst);
    }

    /// Every send fails.
    pub fn fail_all_sends(&self) {
        self.send_failures.store(u32::MAX, Ordering::SeqCst);
    }

    /// The next `count` confirmations report the transaction as dropped.
    pub fn drop_next_confirmations(&self, count: u32) {
        self.unconfirmed.store(count, Ordering::SeqCst);
    }

    /// Number of balance reads served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of send attempts, failed ones included.
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    /// Payloads built so far, in order.
    pub async fn built(&self) -> Vec<TransactionPayload> {
        self.built.read().await.clone()
    }

    async fn record(&self, payload: TransactionPayload) -> anyhow::Result<UnsignedTransaction> {
        if Self::take_one(&self.build_failures) {
            bail!("blockhash unavailable building {}", payload.tx_type());
        }
        let tx_type = payload.tx_type();
        let bytes = serde_json::to_vec(&payload)?;
        self.built.write().await.push(payload);
        Ok(UnsignedTransaction { tx_type, bytes })
    }

    fn take_one(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait]
impl WalletReader for MockChain {
    async fn balance(&self, wallet_id: &str) -> anyhow::Result<Decimal> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("rpc timeout reading {wallet_id}");
        }
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .balances
            .read()
            .await
            .get(wallet_id)
            .copied()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PositionReader for MockChain {
    async fn positions(&self, wallet_id: &str) -> anyhow::Result<Vec<PositionValue>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("rpc timeout reading positions of {wallet_id}");
        }
        Ok(self
            .positions
            .read()
            .await
            .get(wallet_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl TransactionBuilder for MockChain {
    async fn build_add_liquidity(
        &self,
        _wallet_id: &str,
        pool_id: &str,
        amount: Decimal,
        target_bins: u32,
    ) -> anyhow::Result<UnsignedTransaction> {
        self.record(TransactionPayload::AddLiquidity {
            pool_id: pool_id.to_string(),
            amount,
            target_bins,
        })
        .await
    }

    async fn build_remove_liquidity(
        &self,
        _wallet_id: &str,
        pool_id: &str,
        fraction: Decimal,
    ) -> anyhow::Result<UnsignedTransaction> {
        self.record(TransactionPayload::RemoveLiquidity {
            pool_id: pool_id.to_string(),
            fraction,
        })
        .await
    }

    async fn build_swap(
        &self,
        _wallet_id: &str,
        input_mint: &str,
        output_mint: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> anyhow::Result<UnsignedTransaction> {
        self.record(TransactionPayload::Swap {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount,
            slippage_bps,
        })
        .await
    }

    async fn build_emergency_exit(
        &self,
        _wallet_id: &str,
        pool_ids: &[String],
    ) -> anyhow::Result<UnsignedTransaction> {
        self.record(TransactionPayload::EmergencyExit {
            pool_ids: pool_ids.to_vec(),
        })
        .await
    }
}

#[async_trait]
impl TransactionSigner for MockChain {
    async fn sign(
        &self,
        wallet_id: &str,
        transaction: UnsignedTransaction,
    ) -> anyhow::Result<SignedTransaction> {
        if Self::take_one(&self.sign_failures) {
            bail!("no keypair loaded for {wallet_id}");
        }
        let signature = format!("{wallet_id}-sig-{}", self.built.read().await.len());
        Ok(SignedTransaction {
            tx_type: transaction.tx_type,
            bytes: transaction.bytes,
            signature,
        })
    }
}

#[async_trait]
impl TransactionSender for MockChain {
    async fn send(&self, transaction: &SignedTransaction) -> anyhow::Result<String> {
        let attempt = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_one(&self.send_failures) {
            return Err(anyhow!("rpc unavailable (attempt {attempt})"));
        }
        Ok(transaction.signature.clone())
    }

    async fn confirm(&self, _signature: &str) -> anyhow::Result<bool> {
        Ok(!Self::take_one(&self.unconfirmed))
    }
}

/// Recommendations replaced wholesale by the test.
#[derive(Default)]
pub struct StaticRecommendations {
    pools: RwLock<Vec<PoolRecommendation>>,
    fail: AtomicBool,
}

impl StaticRecommendations {
    pub fn new(pools: Vec<PoolRecommendation>) -> Self {
        Self {
            pools: RwLock::new(pools),
            fail: AtomicBool::new(false),
        }
    }

    pub async fn set(&self, pools: Vec<PoolRecommendation>) {
        *self.pools.write().await = pools;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecommendationSource for StaticRecommendations {
    async fn recommended_pools(&self) -> anyhow::Result<Vec<PoolRecommendation>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("recommendation service returned 503");
        }
        Ok(self.pools.read().await.clone())
    }
}
