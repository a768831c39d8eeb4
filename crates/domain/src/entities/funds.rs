use crate::enums::FundsFlow;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Value held in a single LP position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionValue {
    pub pool_id: String,
    pub value_native: Decimal,
    pub value_usd: Decimal,
}

impl PositionValue {
    pub fn new(pool_id: impl Into<String>, value_native: Decimal, value_usd: Decimal) -> Self {
        Self {
            pool_id: pool_id.into(),
            value_native,
            value_usd,
        }
    }
}

/// Balance and positions of an agent's wallet.
///
/// `total_value` always equals `available_balance` plus the native value of
/// every position; the only way to build one is through [`FundsStatus::new`],
/// and deserialization recomputes the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FundsSnapshot")]
pub struct FundsStatus {
    total_value: Decimal,
    available_balance: Decimal,
    positions: Vec<PositionValue>,
    last_update: DateTime<Utc>,
}

impl FundsStatus {
    pub fn new(available_balance: Decimal, positions: Vec<PositionValue>) -> Self {
        Self::at(available_balance, positions, Utc::now())
    }

    pub fn at(
        available_balance: Decimal,
        positions: Vec<PositionValue>,
        last_update: DateTime<Utc>,
    ) -> Self {
        let invested: Decimal = positions.iter().map(|p| p.value_native).sum();
        Self {
            total_value: available_balance + invested,
            available_balance,
            positions,
            last_update,
        }
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn available_balance(&self) -> Decimal {
        self.available_balance
    }

    pub fn positions(&self) -> &[PositionValue] {
        &self.positions
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn holds_pool(&self, pool_id: &str) -> bool {
        self.positions.iter().any(|p| p.pool_id == pool_id)
    }

    /// Sum of the native value across positions.
    pub fn invested_value(&self) -> Decimal {
        self.total_value - self.available_balance
    }
}

#[derive(Deserialize)]
struct FundsSnapshot {
    available_balance: Decimal,
    #[serde(default)]
    positions: Vec<PositionValue>,
    last_update: DateTime<Utc>,
}

impl From<FundsSnapshot> for FundsStatus {
    fn from(snapshot: FundsSnapshot) -> Self {
        Self::at(
            snapshot.available_balance,
            snapshot.positions,
            snapshot.last_update,
        )
    }
}

/// One entry of an agent's transaction ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub flow: FundsFlow,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_total_value_invariant() {
        let funds = FundsStatus::new(
            dec!(2.5),
            vec![
                PositionValue::new("pool-a", dec!(3), dec!(450)),
                PositionValue::new("pool-b", dec!(4.5), dec!(675)),
            ],
        );

        assert_eq!(funds.total_value(), dec!(10));
        assert_eq!(funds.invested_value(), dec!(7.5));
        assert!(funds.holds_pool("pool-b"));
        assert!(!funds.holds_pool("pool-c"));
    }

    #[test]
    fn test_deserialization_recomputes_total() {
        let json = r#"{
            "total_value": "99",
            "available_balance": "1",
            "positions": [{"pool_id": "p", "value_native": "1", "value_usd": "150"}],
            "last_update": "2026-01-01T00:00:00Z"
        }"#;
        let funds: FundsStatus = serde_json::from_str(json).unwrap();
        assert_eq!(funds.total_value(), dec!(2));
    }
}
