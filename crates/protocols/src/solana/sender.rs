use crate::rpc::RpcProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cruise_domain::prelude::SignedTransaction;
use cruise_execution::ports::TransactionSender;
use serde_json::json;
use solana_client::rpc_request::RpcRequest;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Broadcasts signed wire bytes and polls their signature status.
#[derive(Debug, Clone)]
pub struct SolanaSender {
    provider: RpcProvider,
}

impl SolanaSender {
    #[must_use]
    pub fn new(provider: RpcProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TransactionSender for SolanaSender {
    async fn send(&self, transaction: &SignedTransaction) -> Result<String> {
        let encoded = STANDARD.encode(&transaction.bytes);
        debug!(
            tx_type = %transaction.tx_type.as_str(),
            signature = %transaction.signature,
            "Sending transaction..."
        );

        let signature: String = self
            .provider
            .client()
            .send(
                RpcRequest::SendTransaction,
                json!([encoded, { "encoding": "base64" }]),
            )
            .await
            .context("sendTransaction failed")?;

        info!(signature = %signature, "Transaction sent");
        Ok(signature)
    }

    async fn confirm(&self, signature: &str) -> Result<bool> {
        let parsed = Signature::from_str(signature)
            .with_context(|| format!("invalid signature {signature}"))?;
        let attempts = self.provider.config().confirm_attempts.max(1);

        for attempt in 1..=attempts {
            let status = self
                .provider
                .client()
                .get_signature_status(&parsed)
                .await
                .context("Failed to get signature status")?;
            match status {
                Some(Ok(())) => {
                    info!(signature = %signature, "Transaction confirmed");
                    return Ok(true);
                }
                Some(Err(e)) => {
                    warn!(signature = %signature, error = %e, "Transaction landed with an error");
                    return Ok(false);
                }
                None => {
                    debug!(signature = %signature, attempt, "Signature not seen yet");
                    if attempt < attempts {
                        tokio::time::sleep(self.provider.confirm_poll()).await;
                    }
                }
            }
        }

        warn!(signature = %signature, attempts, "Transaction dropped");
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::RpcConfig;

    #[tokio::test]
    async fn test_malformed_signature_is_rejected_locally() {
        let sender = SolanaSender::new(RpcProvider::new(RpcConfig::default()));
        let err = sender.confirm("wallet-sig-1").await.unwrap_err();
        assert!(err.to_string().contains("invalid signature"));
    }
}
