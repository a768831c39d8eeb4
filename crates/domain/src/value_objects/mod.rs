pub mod operation_result;

pub use operation_result::OperationResult;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Returns of an agent, as ratios of value (0.05 = 5%).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Returns {
    pub total: Decimal,
    pub daily: Decimal,
    pub weekly: Decimal,
    pub monthly: Decimal,
}
