//! Health scoring.

use cruise_domain::prelude::*;
use rust_decimal::Decimal;

/// Turns an agent's funds into a health score on the `[0, 5]` scale.
pub trait RiskScorer: Send + Sync {
    /// Returns the raw score and the conditions that lowered it.
    fn score(&self, config: &AgentConfig, funds: &FundsStatus) -> (Decimal, Vec<RiskTrigger>);
}

/// Penalty-based scorer starting from a perfect score.
#[derive(Debug, Clone)]
pub struct DefaultRiskScorer {
    /// Available ratio below which the heavy penalty applies.
    pub critical_available_ratio: Decimal,
    /// Available ratio below which the light penalty applies.
    pub low_available_ratio: Decimal,
    /// Single-pool share above which the heavy penalty applies.
    pub critical_concentration: Decimal,
    /// Single-pool share above which the light penalty applies.
    pub high_concentration: Decimal,
}

impl Default for DefaultRiskScorer {
    fn default() -> Self {
        Self {
            critical_available_ratio: Decimal::new(1, 1), // 10%
            low_available_ratio: Decimal::new(2, 1),      // 20%
            critical_concentration: Decimal::new(7, 1),   // 70%
            high_concentration: Decimal::new(5, 1),       // 50%
        }
    }
}

impl RiskScorer for DefaultRiskScorer {
    fn score(&self, config: &AgentConfig, funds: &FundsStatus) -> (Decimal, Vec<RiskTrigger>) {
        let mut score = MAX_HEALTH_SCORE;
        let mut triggers = Vec::new();
        let total = funds.total_value();
        let available = funds.available_balance();

        if !total.is_zero() {
            let ratio = available / total;
            if ratio < self.critical_available_ratio {
                score -= Decimal::new(15, 1);
                triggers.push(RiskTrigger::LowAvailableRatio { ratio });
            } else if ratio < self.low_available_ratio {
                score -= Decimal::new(75, 2);
                triggers.push(RiskTrigger::LowAvailableRatio { ratio });
            }

            // Only the most concentrated position is penalized.
            if let Some(largest) = funds.positions().iter().max_by_key(|p| p.value_native) {
                let share = largest.value_native / total;
                let penalty = if share > self.critical_concentration {
                    Decimal::TWO
                } else if share > self.high_concentration {
                    Decimal::ONE
                } else {
                    Decimal::ZERO
                };
                if !penalty.is_zero() {
                    score -= penalty;
                    triggers.push(RiskTrigger::PositionConcentration {
                        pool_id: largest.pool_id.clone(),
                        share,
                    });
                }
            }
        }

        if available < config.min_balance {
            score -= Decimal::ONE;
            triggers.push(RiskTrigger::BelowMinBalance {
                available,
                minimum: config.min_balance,
            });
        }

        if available < config.emergency_reserve {
            score -= Decimal::new(5, 1);
            triggers.push(RiskTrigger::BelowEmergencyReserve {
                available,
                reserve: config.emergency_reserve,
            });
        }

        (score.max(Decimal::ZERO), triggers)
    }
}
