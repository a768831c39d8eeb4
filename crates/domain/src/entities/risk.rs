use crate::enums::RiskLevel;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound of the health score scale.
pub const MAX_HEALTH_SCORE: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

/// Condition that lowered an agent's health score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RiskTrigger {
    /// Share of funds kept liquid is low.
    LowAvailableRatio { ratio: Decimal },
    /// A single pool holds a large share of the agent's value.
    PositionConcentration { pool_id: String, share: Decimal },
    /// Available balance is under the configured minimum.
    BelowMinBalance { available: Decimal, minimum: Decimal },
    /// Available balance is under the emergency reserve.
    BelowEmergencyReserve { available: Decimal, reserve: Decimal },
}

/// Point-in-time risk view of an agent. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub health_score: Decimal,
    pub risk_level: RiskLevel,
    pub triggers: Vec<RiskTrigger>,
}

impl RiskAssessment {
    /// Builds an assessment, clamping the score into `[0, 5]` and bucketing
    /// it against the two thresholds.
    pub fn new(
        agent_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        health_score: Decimal,
        thresholds: RiskThresholds,
        triggers: Vec<RiskTrigger>,
    ) -> Self {
        let health_score = health_score.clamp(Decimal::ZERO, MAX_HEALTH_SCORE);
        Self {
            agent_id: agent_id.into(),
            timestamp,
            health_score,
            risk_level: thresholds.classify(health_score),
            triggers,
        }
    }
}

/// Health score thresholds used to bucket assessments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub emergency: Decimal,
    pub medium: Decimal,
}

impl RiskThresholds {
    pub fn new(emergency: Decimal, medium: Decimal) -> Self {
        Self { emergency, medium }
    }

    pub fn classify(&self, score: Decimal) -> RiskLevel {
        if score <= self.emergency / Decimal::TWO {
            RiskLevel::Critical
        } else if score <= self.emergency {
            RiskLevel::High
        } else if score <= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
