use crate::rpc::RpcProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cruise_execution::ports::WalletReader;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::debug;

/// Decimal places of SOL.
pub const SOL_DECIMALS: u32 = 9;

/// Converts lamports to SOL.
#[must_use]
pub fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(lamports), SOL_DECIMALS)
}

/// Reads native SOL balances over RPC.
#[derive(Debug, Clone)]
pub struct SolanaWalletReader {
    provider: RpcProvider,
}

impl SolanaWalletReader {
    #[must_use]
    pub fn new(provider: RpcProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl WalletReader for SolanaWalletReader {
    async fn balance(&self, wallet_id: &str) -> Result<Decimal> {
        let pubkey = Pubkey::from_str(wallet_id)
            .with_context(|| format!("wallet id {wallet_id} is not a valid public key"))?;
        let lamports = self
            .provider
            .client()
            .get_balance(&pubkey)
            .await
            .with_context(|| format!("Failed to get balance of {wallet_id}"))?;
        debug!(wallet = %wallet_id, lamports, "Fetched wallet balance");
        Ok(lamports_to_sol(lamports))
    }
}
