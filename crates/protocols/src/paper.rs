//! Paper-trading chain.
//!
//! Implements every chain port against in-memory balances so the engine
//! can run end to end without a key or an RPC endpoint. Effects are applied
//! when a transaction is sent; a transaction whose effect is impossible
//! (insufficient balance, unknown position) is accepted and later reported
//! as not confirmed, the way a failed on-chain transaction would be.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use cruise_domain::prelude::*;
use cruise_execution::ports::{
    PositionReader, TransactionBuilder, TransactionSender, TransactionSigner, WalletReader,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Network fee charged per landed transaction, in SOL.
pub const DEFAULT_PAPER_FEE: Decimal = Decimal::from_parts(5000, 0, 0, false, 9);

/// What the paper builder encodes into transaction bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PaperOrder {
    wallet_id: String,
    payload: TransactionPayload,
}

#[derive(Debug, Default)]
struct PaperBook {
    balances: HashMap<String, Decimal>,
    positions: HashMap<String, BTreeMap<String, Decimal>>,
    /// Landing outcome per signature.
    landed: HashMap<String, bool>,
}

impl PaperBook {
    fn apply(&mut self, order: &PaperOrder, fee: Decimal) -> Result<()> {
        let balance = self.balances.get(&order.wallet_id).copied().unwrap_or_default();
        let positions = self.positions.entry(order.wallet_id.clone()).or_default();

        let mut next_balance = balance - fee;
        match &order.payload {
            TransactionPayload::AddLiquidity {
                pool_id, amount, ..
            } => {
                next_balance -= *amount;
                if next_balance < Decimal::ZERO {
                    bail!("insufficient balance: {balance} < {amount} + fee");
                }
                *positions.entry(pool_id.clone()).or_default() += *amount;
            }
            TransactionPayload::RemoveLiquidity { pool_id, fraction } => {
                let value = positions
                    .get_mut(pool_id)
                    .with_context(|| format!("no position in pool {pool_id}"))?;
                let fraction = (*fraction).clamp(Decimal::ZERO, Decimal::ONE);
                let withdrawn = *value * fraction;
                *value -= withdrawn;
                next_balance += withdrawn;
                if value.is_zero() || fraction == Decimal::ONE {
                    positions.remove(pool_id);
                }
            }
            TransactionPayload::EmergencyExit { pool_ids } => {
                let targets: Vec<String> = if pool_ids.is_empty() {
                    positions.keys().cloned().collect()
                } else {
                    pool_ids.clone()
                };
                for pool_id in targets {
                    if let Some(value) = positions.remove(&pool_id) {
                        next_balance += value;
                    }
                }
            }
            TransactionPayload::Swap { amount, .. } => {
                if *amount > balance {
                    bail!("insufficient balance for swap: {balance} < {amount}");
                }
            }
        }
        if next_balance < Decimal::ZERO {
            bail!("insufficient balance for fee");
        }
        self.balances.insert(order.wallet_id.clone(), next_balance);
        Ok(())
    }
}

/// Simulated chain for dry runs.
#[derive(Debug)]
pub struct PaperChain {
    book: Mutex<PaperBook>,
    sequence: AtomicU64,
    fee: Decimal,
    usd_price: Decimal,
}

impl Default for PaperChain {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperChain {
    #[must_use]
    pub fn new() -> Self {
        Self {
            book: Mutex::new(PaperBook::default()),
            sequence: AtomicU64::new(0),
            fee: DEFAULT_PAPER_FEE,
            usd_price: Decimal::ZERO,
        }
    }

    /// Sets the per-transaction fee.
    #[must_use]
    pub fn with_fee(mut self, fee: Decimal) -> Self {
        self.fee = fee;
        self
    }

    /// Sets the USD price used to value positions.
    #[must_use]
    pub fn with_usd_price(mut self, usd_price: Decimal) -> Self {
        self.usd_price = usd_price;
        self
    }

    /// Credits `amount` to a wallet.
    pub async fn fund(&self, wallet_id: &str, amount: Decimal) {
        let mut book = self.book.lock().await;
        *book.balances.entry(wallet_id.to_string()).or_default() += amount;
        info!(wallet = %wallet_id, amount = %amount, "Paper wallet funded");
    }

    fn encode(wallet_id: &str, payload: TransactionPayload) -> Result<UnsignedTransaction> {
        let tx_type = payload.tx_type();
        let bytes = serde_json::to_vec(&PaperOrder {
            wallet_id: wallet_id.to_string(),
            payload,
        })?;
        Ok(UnsignedTransaction { tx_type, bytes })
    }

    fn decode(bytes: &[u8]) -> Result<PaperOrder> {
        serde_json::from_slice(bytes).context("not a paper transaction")
    }
}

#[async_trait]
impl WalletReader for PaperChain {
    async fn balance(&self, wallet_id: &str) -> Result<Decimal> {
        let book = self.book.lock().await;
        Ok(book.balances.get(wallet_id).copied().unwrap_or_default())
    }
}

#[async_trait]
impl PositionReader for PaperChain {
    async fn positions(&self, wallet_id: &str) -> Result<Vec<PositionValue>> {
        let book = self.book.lock().await;
        Ok(book
            .positions
            .get(wallet_id)
            .map(|pools| {
                pools
                    .iter()
                    .map(|(pool_id, value)| {
                        PositionValue::new(pool_id.clone(), *value, *value * self.usd_price)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl TransactionBuilder for PaperChain {
    async fn build_add_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        amount: Decimal,
        target_bins: u32,
    ) -> Result<UnsignedTransaction> {
        if amount <= Decimal::ZERO {
            bail!("add liquidity amount must be positive, got {amount}");
        }
        Self::encode(
            wallet_id,
            TransactionPayload::AddLiquidity {
                pool_id: pool_id.to_string(),
                amount,
                target_bins,
            },
        )
    }

    async fn build_remove_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        fraction: Decimal,
    ) -> Result<UnsignedTransaction> {
        Self::encode(
            wallet_id,
            TransactionPayload::RemoveLiquidity {
                pool_id: pool_id.to_string(),
                fraction,
            },
        )
    }

    async fn build_swap(
        &self,
        wallet_id: &str,
        input_mint: &str,
        output_mint: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> Result<UnsignedTransaction> {
        Self::encode(
            wallet_id,
            TransactionPayload::Swap {
                input_mint: input_mint.to_string(),
                output_mint: output_mint.to_string(),
                amount,
                slippage_bps,
            },
        )
    }

    async fn build_emergency_exit(
        &self,
        wallet_id: &str,
        pool_ids: &[String],
    ) -> Result<UnsignedTransaction> {
        Self::encode(
            wallet_id,
            TransactionPayload::EmergencyExit {
                pool_ids: pool_ids.to_vec(),
            },
        )
    }
}

#[async_trait]
impl TransactionSigner for PaperChain {
    async fn sign(
        &self,
        wallet_id: &str,
        transaction: UnsignedTransaction,
    ) -> Result<SignedTransaction> {
        let order = Self::decode(&transaction.bytes)?;
        if order.wallet_id != wallet_id {
            bail!(
                "transaction belongs to wallet {}, not {wallet_id}",
                order.wallet_id
            );
        }
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(SignedTransaction {
            tx_type: transaction.tx_type,
            bytes: transaction.bytes,
            signature: format!("paper-{wallet_id}-{n}"),
        })
    }
}

#[async_trait]
impl TransactionSender for PaperChain {
    async fn send(&self, transaction: &SignedTransaction) -> Result<String> {
        let order = Self::decode(&transaction.bytes)?;
        let mut book = self.book.lock().await;
        let landed = match book.apply(&order, self.fee) {
            Ok(()) => {
                info!(
                    wallet = %order.wallet_id,
                    signature = %transaction.signature,
                    tx_type = %transaction.tx_type.as_str(),
                    "Paper transaction applied"
                );
                true
            }
            Err(e) => {
                warn!(
                    wallet = %order.wallet_id,
                    signature = %transaction.signature,
                    error = %e,
                    "Paper transaction failed on chain"
                );
                false
            }
        };
        book.landed.insert(transaction.signature.clone(), landed);
        Ok(transaction.signature.clone())
    }

    async fn confirm(&self, signature: &str) -> Result<bool> {
        let book = self.book.lock().await;
        let landed = book.landed.get(signature).copied().unwrap_or(false);
        debug!(signature = %signature, landed, "Paper confirmation");
        Ok(landed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn run(chain: &PaperChain, wallet: &str, tx: UnsignedTransaction) -> bool {
        let signed = chain.sign(wallet, tx).await.unwrap();
        let signature = chain.send(&signed).await.unwrap();
        chain.confirm(&signature).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_and_remove_liquidity_move_funds() {
        let chain = PaperChain::new().with_fee(Decimal::ZERO).with_usd_price(dec!(100));
        chain.fund("w", dec!(10)).await;

        let add = chain.build_add_liquidity("w", "pool", dec!(4), 20).await.unwrap();
        assert!(run(&chain, "w", add).await);
        assert_eq!(chain.balance("w").await.unwrap(), dec!(6));
        assert_eq!(
            chain.positions("w").await.unwrap(),
            vec![PositionValue::new("pool", dec!(4), dec!(400))]
        );

        let remove = chain.build_remove_liquidity("w", "pool", dec!(0.25)).await.unwrap();
        assert!(run(&chain, "w", remove).await);
        assert_eq!(chain.balance("w").await.unwrap(), dec!(7));
        assert_eq!(chain.positions("w").await.unwrap()[0].value_native, dec!(3));
    }

    #[tokio::test]
    async fn test_impossible_transaction_is_not_confirmed() {
        let chain = PaperChain::new();
        chain.fund("w", dec!(1)).await;

        let add = chain.build_add_liquidity("w", "pool", dec!(5), 20).await.unwrap();
        assert!(!run(&chain, "w", add).await);
        assert_eq!(chain.balance("w").await.unwrap(), dec!(1));

        let remove = chain.build_remove_liquidity("w", "missing", Decimal::ONE).await.unwrap();
        assert!(!run(&chain, "w", remove).await);
    }

    #[tokio::test]
    async fn test_emergency_exit_closes_everything_and_charges_fee() {
        let chain = PaperChain::new();
        chain.fund("w", dec!(3)).await;
        for pool in ["a", "b"] {
            let add = chain.build_add_liquidity("w", pool, dec!(1), 10).await.unwrap();
            assert!(run(&chain, "w", add).await);
        }

        let exit = chain.build_emergency_exit("w", &[]).await.unwrap();
        assert!(run(&chain, "w", exit).await);
        assert!(chain.positions("w").await.unwrap().is_empty());
        assert_eq!(chain.balance("w").await.unwrap(), dec!(3) - DEFAULT_PAPER_FEE * dec!(3));
    }

    #[tokio::test]
    async fn test_wrong_wallet_cannot_sign() {
        let chain = PaperChain::new();
        let tx = chain.build_swap("w", "SOL", "USDC", dec!(1), 50).await.unwrap();
        assert!(chain.sign("other", tx).await.is_err());
        assert!(!chain.confirm("paper-unknown").await.unwrap());
    }
}
