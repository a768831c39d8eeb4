//! Request lifecycle driver.

use crate::ports::{TransactionBuilder, TransactionSender, TransactionSigner};
use chrono::Utc;
use cruise_domain::error::Result;
use cruise_domain::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the transaction executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Wait before each retry, indexed by retry count; the last entry
    /// repeats.
    pub backoff_secs: Vec<u64>,
    /// Retries allowed when a request does not set its own.
    pub max_retries: u32,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            backoff_secs: vec![5, 15, 30],
            max_retries: 3,
        }
    }
}

impl ExecutorSettings {
    /// Delay before the retry following `retry_count` previous retries.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let Some(last) = self.backoff_secs.len().checked_sub(1) else {
            return Duration::ZERO;
        };
        let index = (retry_count as usize).min(last);
        Duration::from_secs(self.backoff_secs[index])
    }
}

/// A request and the handle used to interrupt its backoff wait.
struct TrackedRequest {
    request: TransactionRequest,
    cancel: Arc<Notify>,
}

/// Drives transaction requests through build, sign, send and confirm.
pub struct TransactionExecutor {
    builder: Arc<dyn TransactionBuilder>,
    signer: Arc<dyn TransactionSigner>,
    sender: Arc<dyn TransactionSender>,
    /// Configuration.
    settings: ExecutorSettings,
    /// Non-terminal requests by id.
    requests: RwLock<HashMap<Uuid, TrackedRequest>>,
}

impl TransactionExecutor {
    /// Creates a new executor.
    pub fn new(
        builder: Arc<dyn TransactionBuilder>,
        signer: Arc<dyn TransactionSigner>,
        sender: Arc<dyn TransactionSender>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            builder,
            signer,
            sender,
            settings,
            requests: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a pending request to the table and returns its id.
    pub async fn create_request(
        &self,
        agent_id: &str,
        wallet_id: &str,
        payload: TransactionPayload,
        priority: TransactionPriority,
        max_retries: Option<u32>,
    ) -> Uuid {
        let request = TransactionRequest::new(
            agent_id,
            wallet_id,
            payload,
            priority,
            max_retries.unwrap_or(self.settings.max_retries),
        );
        let id = request.id;

        debug!(
            request_id = %id,
            agent_id = agent_id,
            tx_type = %request.tx_type(),
            priority = ?priority,
            "Transaction request created"
        );
        self.requests.write().await.insert(
            id,
            TrackedRequest {
                request,
                cancel: Arc::new(Notify::new()),
            },
        );
        id
    }

    /// Creates and executes a request in one call.
    pub async fn submit(
        &self,
        agent_id: &str,
        wallet_id: &str,
        payload: TransactionPayload,
        priority: TransactionPriority,
        max_retries: Option<u32>,
    ) -> TransactionResult {
        let id = self
            .create_request(agent_id, wallet_id, payload, priority, max_retries)
            .await;
        match self.execute(id).await {
            Ok(result) => result,
            Err(e) => TransactionResult::failed(id, e.to_string(), 0),
        }
    }

    /// Runs a pending request to a terminal status.
    ///
    /// Retry exhaustion and cancellation come back as an unsuccessful
    /// [`TransactionResult`]; only an unknown id is an error.
    pub async fn execute(&self, id: Uuid) -> Result<TransactionResult> {
        let (payload, wallet_id, agent_id, max_retries, cancel) = {
            let requests = self.requests.read().await;
            let tracked = requests.get(&id).ok_or(CruiseError::RequestNotFound(id))?;
            let r = &tracked.request;
            if r.status != TransactionStatus::Pending {
                return Ok(TransactionResult::failed(
                    id,
                    format!("request is {:?}, not pending", r.status),
                    r.retry_count,
                ));
            }
            (
                r.payload.clone(),
                r.wallet_id.clone(),
                r.agent_id.clone(),
                r.max_retries,
                Arc::clone(&tracked.cancel),
            )
        };

        info!(
            request_id = %id,
            agent_id = %agent_id,
            tx_type = %payload.tx_type(),
            "Executing transaction"
        );

        let mut retry_count = 0;
        loop {
            if !self.advance(id, TransactionStatus::Signing).await {
                return Ok(self.finish_cancelled(id, retry_count).await);
            }

            let error = match self.attempt(id, &wallet_id, &payload).await {
                Ok(signature) => {
                    self.advance(id, TransactionStatus::Confirmed).await;
                    let result = TransactionResult::confirmed(id, signature, retry_count);
                    self.finish(id, result.clone()).await;
                    info!(request_id = %id, retries = retry_count, "Transaction confirmed");
                    return Ok(result);
                }
                Err(e) => format!("{e:#}"),
            };

            self.fail(id, &error).await;
            if retry_count >= max_retries {
                warn!(
                    request_id = %id,
                    agent_id = %agent_id,
                    retries = retry_count,
                    error = %error,
                    "Transaction failed, retries exhausted"
                );
                let result = TransactionResult::failed(id, error, retry_count);
                self.finish(id, result.clone()).await;
                return Ok(result);
            }

            if !self.advance(id, TransactionStatus::Retrying).await {
                return Ok(self.finish_cancelled(id, retry_count).await);
            }

            let delay = self.settings.backoff(retry_count);
            warn!(
                request_id = %id,
                retry = retry_count + 1,
                delay_secs = delay.as_secs(),
                error = %error,
                "Transaction attempt failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.notified() => {}
            }

            retry_count += 1;
            let mut requests = self.requests.write().await;
            match requests.get_mut(&id) {
                Some(tracked) if tracked.request.status == TransactionStatus::Retrying => {
                    tracked.request.retry_count = retry_count;
                }
                _ => {
                    drop(requests);
                    return Ok(self.finish_cancelled(id, retry_count - 1).await);
                }
            }
        }
    }

    /// One build, sign, send and confirm pass. Returns the signature.
    async fn attempt(
        &self,
        id: Uuid,
        wallet_id: &str,
        payload: &TransactionPayload,
    ) -> anyhow::Result<String> {
        let unsigned = self.build(wallet_id, payload).await?;
        let signed = self.signer.sign(wallet_id, unsigned).await?;

        self.advance(id, TransactionStatus::Sending).await;
        let signature = self.sender.send(&signed).await?;

        self.advance(id, TransactionStatus::Confirming).await;
        if !self.sender.confirm(&signature).await? {
            anyhow::bail!("transaction {signature} was not confirmed");
        }
        Ok(signature)
    }

    async fn build(
        &self,
        wallet_id: &str,
        payload: &TransactionPayload,
    ) -> anyhow::Result<UnsignedTransaction> {
        match payload {
            TransactionPayload::AddLiquidity {
                pool_id,
                amount,
                target_bins,
            } => {
                self.builder
                    .build_add_liquidity(wallet_id, pool_id, *amount, *target_bins)
                    .await
            }
            TransactionPayload::RemoveLiquidity { pool_id, fraction } => {
                self.builder
                    .build_remove_liquidity(wallet_id, pool_id, *fraction)
                    .await
            }
            TransactionPayload::Swap {
                input_mint,
                output_mint,
                amount,
                slippage_bps,
            } => {
                self.builder
                    .build_swap(wallet_id, input_mint, output_mint, *amount, *slippage_bps)
                    .await
            }
            TransactionPayload::EmergencyExit { pool_ids } => {
                self.builder.build_emergency_exit(wallet_id, pool_ids).await
            }
        }
    }

    /// Moves a request to `next` if the transition table allows it.
    async fn advance(&self, id: Uuid, next: TransactionStatus) -> bool {
        let mut requests = self.requests.write().await;
        let Some(tracked) = requests.get_mut(&id) else {
            return false;
        };
        let request = &mut tracked.request;
        if !request.status.can_transition_to(next) {
            debug!(request_id = %id, from = ?request.status, to = ?next, "Transition refused");
            return false;
        }
        request.status = next;
        request.updated_at = Utc::now();
        true
    }

    async fn fail(&self, id: Uuid, error: &str) {
        if self.advance(id, TransactionStatus::Failed).await
            && let Some(tracked) = self.requests.write().await.get_mut(&id)
        {
            tracked.request.error = Some(error.to_string());
        }
    }

    /// Removes a terminal request from the table.
    async fn finish(&self, id: Uuid, result: TransactionResult) {
        if let Some(mut tracked) = self.requests.write().await.remove(&id) {
            tracked.request.result = Some(result);
            debug!(request_id = %id, status = ?tracked.request.status, "Request finished");
        }
    }

    async fn finish_cancelled(&self, id: Uuid, retry_count: u32) -> TransactionResult {
        info!(request_id = %id, "Transaction cancelled");
        let result = TransactionResult::failed(id, "cancelled", retry_count);
        self.finish(id, result.clone()).await;
        result
    }

    /// Cancels a request that is pending or waiting to retry.
    ///
    /// Returns `false` for unknown requests and for any other status.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let mut requests = self.requests.write().await;
        let Some(tracked) = requests.get_mut(&id) else {
            return false;
        };
        if !tracked.request.status.is_cancellable() {
            return false;
        }

        let was_pending = tracked.request.status == TransactionStatus::Pending;
        tracked.request.status = TransactionStatus::Cancelled;
        tracked.request.updated_at = Utc::now();
        tracked.cancel.notify_one();

        // Pending requests have no executor loop to clean them up.
        if was_pending {
            requests.remove(&id);
        }
        info!(request_id = %id, "Transaction request cancelled");
        true
    }

    /// Snapshot of a request still in the table.
    pub async fn get_request(&self, id: Uuid) -> Option<TransactionRequest> {
        self.requests
            .read()
            .await
            .get(&id)
            .map(|t| t.request.clone())
    }

    /// Requests not yet terminal, highest priority first, then oldest.
    pub async fn pending_requests(&self) -> Vec<TransactionRequest> {
        let mut requests: Vec<TransactionRequest> = self
            .requests
            .read()
            .await
            .values()
            .map(|t| t.request.clone())
            .collect();
        requests.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        requests
    }
}
