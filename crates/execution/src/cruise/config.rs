//! Service settings and per-agent configuration merging.

use crate::funds::FundsSettings;
use crate::risk::RiskSettings;
use crate::transaction::ExecutorSettings;
use cruise_domain::error::Result;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator defaults applied to agents that leave a value unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CruiseDefaults {
    /// Seconds between health checks.
    pub health_check_interval_secs: u64,
    /// Seconds between market change checks.
    pub market_check_interval_secs: u64,
    /// Seconds between full optimizations.
    pub optimization_interval_secs: u64,
    /// Bins requested when a recommendation does not suggest any.
    pub default_target_bins: u32,
    /// Health lead an unheld pool needs over the best held one before a
    /// market check opens it.
    pub improvement_margin: Decimal,
}

impl Default for CruiseDefaults {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 1800,  // 30 minutes
            market_check_interval_secs: 900,   // 15 minutes
            optimization_interval_secs: 86400, // 24 hours
            default_target_bins: 20,
            improvement_margin: Decimal::new(5, 1), // 0.5
        }
    }
}

/// Every tunable of the engine, as loaded from the `[service]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CruiseSettings {
    pub defaults: CruiseDefaults,
    pub funds: FundsSettings,
    pub executor: ExecutorSettings,
    pub risk: RiskSettings,
}

/// An agent's config with the orchestrator defaults filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct CruiseConfig {
    pub agent_id: String,
    pub agent: AgentConfig,
    pub health_check_interval: Duration,
    pub market_check_interval: Duration,
    pub optimization_interval: Duration,
}

impl CruiseConfig {
    /// Validates `config` and resolves its intervals against `defaults`.
    pub fn merge(agent_id: &str, config: AgentConfig, defaults: &CruiseDefaults) -> Result<Self> {
        if agent_id.trim().is_empty() {
            return Err(CruiseError::InvalidConfig("agent id is empty".into()));
        }
        if config.wallet_id.trim().is_empty() {
            return Err(CruiseError::MissingWallet(agent_id.to_string()));
        }
        if config.max_positions == 0 {
            return Err(CruiseError::InvalidConfig(format!(
                "agent {agent_id}: max_positions must be at least 1"
            )));
        }
        if config.emergency_threshold >= config.medium_risk_threshold {
            return Err(CruiseError::InvalidConfig(format!(
                "agent {agent_id}: emergency_threshold {} must be below medium_risk_threshold {}",
                config.emergency_threshold, config.medium_risk_threshold
            )));
        }
        if config.min_balance.is_sign_negative() || config.emergency_reserve.is_sign_negative() {
            return Err(CruiseError::InvalidConfig(format!(
                "agent {agent_id}: balances must not be negative"
            )));
        }

        let secs = |value: Option<u64>, fallback: u64| Duration::from_secs(value.unwrap_or(fallback).max(1));
        Ok(Self {
            agent_id: agent_id.to_string(),
            health_check_interval: secs(
                config.health_check_interval_secs,
                defaults.health_check_interval_secs,
            ),
            market_check_interval: secs(
                config.market_check_interval_secs,
                defaults.market_check_interval_secs,
            ),
            optimization_interval: secs(
                config.optimization_interval_secs,
                defaults.optimization_interval_secs,
            ),
            agent: config,
        })
    }

    /// Tag shared by every scheduled task of this agent.
    pub fn tag(&self) -> String {
        agent_tag(&self.agent_id)
    }
}

/// Scheduler tag for an agent's tasks.
pub fn agent_tag(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_fill_unset_intervals() {
        let mut config = AgentConfig::new("a", "wallet");
        config.market_check_interval_secs = Some(60);

        let merged = CruiseConfig::merge("a", config, &CruiseDefaults::default()).unwrap();
        assert_eq!(merged.health_check_interval, Duration::from_secs(1800));
        assert_eq!(merged.market_check_interval, Duration::from_secs(60));
        assert_eq!(merged.optimization_interval, Duration::from_secs(86400));
        assert_eq!(merged.tag(), "agent:a");
    }

    #[test]
    fn test_missing_wallet_is_configuration_error() {
        let err = CruiseConfig::merge("a", AgentConfig::new("a", ""), &CruiseDefaults::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = AgentConfig::new("a", "wallet");
        config.emergency_threshold = dec!(3);
        config.medium_risk_threshold = dec!(2);
        assert!(matches!(
            CruiseConfig::merge("a", config, &CruiseDefaults::default()),
            Err(CruiseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_settings_parse_from_partial_json() {
        let settings: CruiseSettings = serde_json::from_str(
            r#"{"executor": {"backoff_secs": [1, 2]}, "defaults": {"health_check_interval_secs": 60}}"#,
        )
        .unwrap();
        assert_eq!(settings.executor.backoff_secs, vec![1, 2]);
        assert_eq!(settings.executor.max_retries, 3);
        assert_eq!(settings.defaults.health_check_interval_secs, 60);
        assert_eq!(settings.defaults.market_check_interval_secs, 900);
        assert_eq!(settings.risk.history_capacity, 100);
    }
}
