pub mod agent;
pub mod funds;
pub mod pool;
pub mod risk;
pub mod transaction;

// Re-export for easier access
pub use agent::{AgentConfig, AgentStatus};
pub use funds::{FundsStatus, PositionValue, TransactionRecord};
pub use pool::{OptimizationAction, PoolRecommendation};
pub use risk::{MAX_HEALTH_SCORE, RiskAssessment, RiskThresholds, RiskTrigger};
pub use transaction::{
    SignedTransaction, TransactionPayload, TransactionRequest, TransactionResult,
    UnsignedTransaction,
};
