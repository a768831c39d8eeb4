use crate::entities::funds::FundsStatus;
use crate::enums::{AgentState, RiskTolerance};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable per-agent settings supplied at registration.
///
/// Interval fields left as `None` fall back to the orchestrator defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Human readable name.
    pub name: String,
    /// Wallet the agent signs with (base58 public key).
    pub wallet_id: String,
    /// Maximum number of simultaneously open positions.
    pub max_positions: usize,
    /// Minimum native balance kept outside of positions.
    pub min_balance: Decimal,
    /// Health score the agent aims to keep its positions above.
    pub target_health_score: Decimal,
    /// Appetite for risk when picking pools.
    pub risk_tolerance: RiskTolerance,
    /// Seconds between health checks.
    pub health_check_interval_secs: Option<u64>,
    /// Seconds between market change checks.
    pub market_check_interval_secs: Option<u64>,
    /// Seconds between full optimizations.
    pub optimization_interval_secs: Option<u64>,
    /// Health score at or below which the agent is in emergency territory.
    pub emergency_threshold: Decimal,
    /// Health score at or below which the agent is in medium risk.
    pub medium_risk_threshold: Decimal,
    /// Balance floor that triggers funds safety alerts.
    pub emergency_reserve: Decimal,
    /// Capital originally committed to the agent, used for returns.
    pub initial_investment: Decimal,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            wallet_id: String::new(),
            max_positions: 3,
            min_balance: Decimal::new(1, 1),           // 0.1
            target_health_score: Decimal::new(35, 1),  // 3.5
            risk_tolerance: RiskTolerance::Moderate,
            health_check_interval_secs: None,
            market_check_interval_secs: None,
            optimization_interval_secs: None,
            emergency_threshold: Decimal::new(15, 1),  // 1.5
            medium_risk_threshold: Decimal::new(25, 1), // 2.5
            emergency_reserve: Decimal::new(5, 2),     // 0.05
            initial_investment: Decimal::ZERO,
        }
    }
}

impl AgentConfig {
    /// Creates a config with defaults for everything but the identity.
    pub fn new(name: impl Into<String>, wallet_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wallet_id: wallet_id.into(),
            ..Default::default()
        }
    }
}

/// Snapshot of an agent, persisted on every transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub state: AgentState,
    pub config: AgentConfig,
    pub funds: Option<FundsStatus>,
    pub last_update: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl AgentStatus {
    /// Fresh status for an agent that has never been persisted.
    pub fn initializing(agent_id: impl Into<String>, config: AgentConfig) -> Self {
        Self {
            agent_id: agent_id.into(),
            state: AgentState::Initializing,
            config,
            funds: None,
            last_update: Utc::now(),
            last_error: None,
        }
    }
}
