//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use cruise_execution::prelude::*;
//! ```

// Cruise
pub use crate::cruise::{
    CruiseConfig, CruiseDefaults, CruisePorts, CruiseService, CruiseSettings,
    RecommendationOptimizer, ServiceStatus, agent_tag,
};

// Funds
pub use crate::funds::{FundsManager, FundsSafetyAlert, FundsSettings};

// Lifecycle
pub use crate::lifecycle::{AgentStateMachine, StateTransition};

// Metrics
pub use crate::metrics::{AgentMetrics, InMemoryMetrics, MetricsSnapshot};

// Ports
pub use crate::ports::{
    AgentStateStore, MetricsSink, PositionOptimizer, PositionReader, RecommendationSource,
    TransactionBuilder, TransactionSender, TransactionSigner, WalletReader,
};

// Risk
pub use crate::risk::{
    DefaultRiskScorer, EscalationWindows, RiskController, RiskEscalation, RiskScorer,
    RiskSettings,
};

// Scheduler
pub use crate::scheduler::{Schedule, ScheduledTaskManager, TaskHandler, TaskId, TaskInfo, task_handler};

// Transaction
pub use crate::transaction::{ExecutorSettings, TransactionExecutor};
