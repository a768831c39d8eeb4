use super::{HttpSettings, check_status};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use cruise_domain::prelude::*;
use cruise_execution::ports::{PositionReader, TransactionBuilder};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Serialize)]
struct BuildRequest<'a> {
    wallet_id: &'a str,
    #[serde(flatten)]
    payload: &'a TransactionPayload,
}

#[derive(Deserialize)]
struct BuildResponse {
    /// Base64 wire bytes with empty signature slots.
    transaction: String,
}

/// Client for the LP gateway that knows pool programs.
///
/// Reads open positions and builds unsigned transactions; signing and
/// broadcast stay with the chain adapters.
#[derive(Debug, Clone)]
pub struct HttpLpGateway {
    client: Client,
    settings: HttpSettings,
}

impl HttpLpGateway {
    /// Creates a gateway client for `settings.base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: HttpSettings) -> Result<Self> {
        Ok(Self {
            client: settings.client()?,
            settings,
        })
    }

    async fn build(&self, wallet_id: &str, payload: TransactionPayload) -> Result<UnsignedTransaction> {
        let url = self.settings.url("/transactions");
        let tx_type = payload.tx_type();
        debug!(wallet = %wallet_id, tx_type = %tx_type.as_str(), "Building transaction");

        let response = self
            .client
            .post(&url)
            .json(&BuildRequest {
                wallet_id,
                payload: &payload,
            })
            .send()
            .await
            .with_context(|| format!("Network error calling {url}"))?;
        let response = check_status(response, "LP gateway").await?;

        let body: BuildResponse = response
            .json()
            .await
            .context("Failed to parse built transaction")?;
        let bytes = STANDARD
            .decode(body.transaction.as_bytes())
            .context("Gateway returned invalid base64")?;
        Ok(UnsignedTransaction { tx_type, bytes })
    }
}

#[async_trait]
impl PositionReader for HttpLpGateway {
    async fn positions(&self, wallet_id: &str) -> Result<Vec<PositionValue>> {
        let url = self.settings.url(&format!("/wallets/{wallet_id}/positions"));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Network error calling {url}"))?;
        let response = check_status(response, "LP gateway").await?;
        let positions: Vec<PositionValue> = response
            .json()
            .await
            .context("Failed to parse positions")?;
        debug!(wallet = %wallet_id, count = positions.len(), "Fetched positions");
        Ok(positions)
    }
}

#[async_trait]
impl TransactionBuilder for HttpLpGateway {
    async fn build_add_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        amount: Decimal,
        target_bins: u32,
    ) -> Result<UnsignedTransaction> {
        self.build(
            wallet_id,
            TransactionPayload::AddLiquidity {
                pool_id: pool_id.to_string(),
                amount,
                target_bins,
            },
        )
        .await
    }

    async fn build_remove_liquidity(
        &self,
        wallet_id: &str,
        pool_id: &str,
        fraction: Decimal,
    ) -> Result<UnsignedTransaction> {
        self.build(
            wallet_id,
            TransactionPayload::RemoveLiquidity {
                pool_id: pool_id.to_string(),
                fraction,
            },
        )
        .await
    }

    async fn build_swap(
        &self,
        wallet_id: &str,
        input_mint: &str,
        output_mint: &str,
        amount: Decimal,
        slippage_bps: u16,
    ) -> Result<UnsignedTransaction> {
        self.build(
            wallet_id,
            TransactionPayload::Swap {
                input_mint: input_mint.to_string(),
                output_mint: output_mint.to_string(),
                amount,
                slippage_bps,
            },
        )
        .await
    }

    async fn build_emergency_exit(
        &self,
        wallet_id: &str,
        pool_ids: &[String],
    ) -> Result<UnsignedTransaction> {
        self.build(
            wallet_id,
            TransactionPayload::EmergencyExit {
                pool_ids: pool_ids.to_vec(),
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn gateway_router() -> Router {
        Router::new()
            .route(
                "/wallets/{wallet}/positions",
                get(|Path(wallet): Path<String>| async move {
                    Json(json!([
                        {"pool_id": format!("{wallet}-pool"), "value_native": "1.5", "value_usd": "225"}
                    ]))
                }),
            )
            .route(
                "/transactions",
                post(|Json(body): Json<Value>| async move {
                    // Echo the request so the test can check what was sent.
                    let echoed = serde_json::to_vec(&body).unwrap();
                    Json(json!({ "transaction": STANDARD.encode(echoed) }))
                }),
            )
    }

    #[tokio::test]
    async fn test_reads_positions() {
        let gateway = HttpLpGateway::new(HttpSettings::new(serve(gateway_router()).await)).unwrap();
        let positions = gateway.positions("w1").await.unwrap();
        assert_eq!(positions, vec![PositionValue::new("w1-pool", dec!(1.5), dec!(225))]);
    }

    #[tokio::test]
    async fn test_builds_tagged_request_and_decodes_bytes() {
        let gateway = HttpLpGateway::new(HttpSettings::new(serve(gateway_router()).await)).unwrap();
        let tx = gateway
            .build_remove_liquidity("w1", "pool-a", dec!(0.3))
            .await
            .unwrap();
        assert_eq!(tx.tx_type, TransactionType::RemoveLiquidity);

        let sent: Value = serde_json::from_slice(&tx.bytes).unwrap();
        assert_eq!(sent["wallet_id"], "w1");
        assert_eq!(sent["type"], "remove_liquidity");
        assert_eq!(sent["pool_id"], "pool-a");
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_an_error() {
        let gateway = HttpLpGateway::new(HttpSettings::new("http://127.0.0.1:1")).unwrap();
        assert!(gateway.build_emergency_exit("w1", &[]).await.is_err());
    }
}
