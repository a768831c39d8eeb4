use crate::enums::{TransactionPriority, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed payload of a transaction, one shape per [`TransactionType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionPayload {
    AddLiquidity {
        pool_id: String,
        amount: Decimal,
        target_bins: u32,
    },
    RemoveLiquidity {
        pool_id: String,
        /// Share of the position to withdraw, `1` closes it.
        fraction: Decimal,
    },
    Swap {
        input_mint: String,
        output_mint: String,
        amount: Decimal,
        slippage_bps: u16,
    },
    EmergencyExit {
        pool_ids: Vec<String>,
    },
}

impl TransactionPayload {
    #[must_use]
    pub fn tx_type(&self) -> TransactionType {
        match self {
            Self::AddLiquidity { .. } => TransactionType::AddLiquidity,
            Self::RemoveLiquidity { .. } => TransactionType::RemoveLiquidity,
            Self::Swap { .. } => TransactionType::Swap,
            Self::EmergencyExit { .. } => TransactionType::EmergencyExit,
        }
    }

    /// Native amount moved out of the wallet, if the payload spends any.
    #[must_use]
    pub fn outflow_amount(&self) -> Option<Decimal> {
        match self {
            Self::AddLiquidity { amount, .. } | Self::Swap { amount, .. } => Some(*amount),
            Self::RemoveLiquidity { .. } | Self::EmergencyExit { .. } => None,
        }
    }
}

/// A transaction tracked by the executor from creation to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub id: Uuid,
    pub agent_id: String,
    pub wallet_id: String,
    pub priority: TransactionPriority,
    pub status: TransactionStatus,
    pub payload: TransactionPayload,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub result: Option<TransactionResult>,
    pub error: Option<String>,
}

impl TransactionRequest {
    pub fn new(
        agent_id: impl Into<String>,
        wallet_id: impl Into<String>,
        payload: TransactionPayload,
        priority: TransactionPriority,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            wallet_id: wallet_id.into(),
            priority,
            status: TransactionStatus::Pending,
            payload,
            retry_count: 0,
            max_retries,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    pub fn tx_type(&self) -> TransactionType {
        self.payload.tx_type()
    }

    /// Whether no further status change can happen.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TransactionStatus::Confirmed | TransactionStatus::Cancelled => true,
            TransactionStatus::Failed => self.retry_count >= self.max_retries,
            _ => false,
        }
    }
}

/// Outcome of a transaction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub request_id: Uuid,
    pub success: bool,
    pub signature: Option<String>,
    pub error: Option<String>,
    pub retries: u32,
}

impl TransactionResult {
    #[must_use]
    pub fn confirmed(request_id: Uuid, signature: String, retries: u32) -> Self {
        Self {
            request_id,
            success: true,
            signature: Some(signature),
            error: None,
            retries,
        }
    }

    #[must_use]
    pub fn failed(request_id: Uuid, error: impl Into<String>, retries: u32) -> Self {
        Self {
            request_id,
            success: false,
            signature: None,
            error: Some(error.into()),
            retries,
        }
    }
}

/// Transaction bytes produced by a builder, not yet signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub tx_type: TransactionType,
    pub bytes: Vec<u8>,
}

/// Transaction bytes ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx_type: TransactionType,
    pub bytes: Vec<u8>,
    /// Signature identifying the transaction on chain.
    pub signature: String,
}
