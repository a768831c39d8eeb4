use crate::entities::transaction::TransactionPayload;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A pool ranked by the recommendation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecommendation {
    pub pool_id: String,
    pub health_score: Decimal,
    #[serde(default)]
    pub suggested_bins: Option<u32>,
    #[serde(default)]
    pub expected_apr: Option<Decimal>,
}

impl PoolRecommendation {
    pub fn new(pool_id: impl Into<String>, health_score: Decimal) -> Self {
        Self {
            pool_id: pool_id.into(),
            health_score,
            suggested_bins: None,
            expected_apr: None,
        }
    }
}

/// One step of an optimization plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OptimizationAction {
    Add {
        pool_id: String,
        amount: Decimal,
        target_bins: u32,
    },
    Remove {
        pool_id: String,
    },
    /// Trims a position by `fraction` of its liquidity.
    Adjust {
        pool_id: String,
        fraction: Decimal,
    },
}

impl OptimizationAction {
    pub fn pool_id(&self) -> &str {
        match self {
            Self::Add { pool_id, .. } | Self::Remove { pool_id } | Self::Adjust { pool_id, .. } => {
                pool_id
            }
        }
    }

    /// Transaction payload that carries out this action.
    pub fn to_payload(&self) -> TransactionPayload {
        match self {
            Self::Add {
                pool_id,
                amount,
                target_bins,
            } => TransactionPayload::AddLiquidity {
                pool_id: pool_id.clone(),
                amount: *amount,
                target_bins: *target_bins,
            },
            Self::Remove { pool_id } => TransactionPayload::RemoveLiquidity {
                pool_id: pool_id.clone(),
                fraction: Decimal::ONE,
            },
            Self::Adjust { pool_id, fraction } => TransactionPayload::RemoveLiquidity {
                pool_id: pool_id.clone(),
                fraction: (*fraction).clamp(Decimal::ZERO, Decimal::ONE),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::TransactionType;
    use rust_decimal_macros::dec;

    #[test]
    fn test_action_mapping() {
        let remove = OptimizationAction::Remove {
            pool_id: "p".into(),
        };
        assert_eq!(remove.to_payload().tx_type(), TransactionType::RemoveLiquidity);

        let adjust = OptimizationAction::Adjust {
            pool_id: "p".into(),
            fraction: dec!(1.7),
        };
        match adjust.to_payload() {
            TransactionPayload::RemoveLiquidity { fraction, .. } => {
                assert_eq!(fraction, Decimal::ONE)
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
