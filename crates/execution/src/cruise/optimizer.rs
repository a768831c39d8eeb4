//! Recommendation-driven position optimizer.

use crate::ports::PositionOptimizer;
use async_trait::async_trait;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Replaces positions that fell out of the recommended set, or below the
/// agent's target health, with the best unheld recommendations.
#[derive(Debug, Clone)]
pub struct RecommendationOptimizer {
    /// Bins requested when a recommendation does not suggest any.
    pub default_target_bins: u32,
}

impl Default for RecommendationOptimizer {
    fn default() -> Self {
        Self {
            default_target_bins: 20,
        }
    }
}

impl RecommendationOptimizer {
    pub fn new(default_target_bins: u32) -> Self {
        Self {
            default_target_bins,
        }
    }

    fn unhealthy(
        config: &AgentConfig,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> Vec<String> {
        let scores: HashMap<&str, Decimal> = recommendations
            .iter()
            .map(|r| (r.pool_id.as_str(), r.health_score))
            .collect();

        funds
            .positions()
            .iter()
            .filter(|p| match scores.get(p.pool_id.as_str()) {
                Some(score) => *score < config.target_health_score,
                None => true,
            })
            .map(|p| p.pool_id.clone())
            .collect()
    }
}

#[async_trait]
impl PositionOptimizer for RecommendationOptimizer {
    async fn unhealthy_positions(
        &self,
        config: &AgentConfig,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> anyhow::Result<Vec<String>> {
        Ok(Self::unhealthy(config, funds, recommendations))
    }

    async fn plan(
        &self,
        config: &AgentConfig,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> anyhow::Result<Vec<OptimizationAction>> {
        let unhealthy = Self::unhealthy(config, funds, recommendations);

        let mut actions: Vec<OptimizationAction> = unhealthy
            .iter()
            .map(|pool_id| OptimizationAction::Remove {
                pool_id: pool_id.clone(),
            })
            .collect();

        let freed: Decimal = funds
            .positions()
            .iter()
            .filter(|p| unhealthy.contains(&p.pool_id))
            .map(|p| p.value_native)
            .sum();
        let kept = funds.positions().len() - unhealthy.len();
        let open_slots = config.max_positions.saturating_sub(kept);
        let budget = funds.available_balance() + freed - config.min_balance;
        if open_slots == 0 || budget <= Decimal::ZERO {
            return Ok(actions);
        }

        let mut candidates: Vec<&PoolRecommendation> = recommendations
            .iter()
            .filter(|r| !funds.holds_pool(&r.pool_id))
            .filter(|r| r.health_score >= config.target_health_score)
            .collect();
        candidates.sort_by(|a, b| b.health_score.cmp(&a.health_score));
        candidates.truncate(open_slots);

        let per_slot = budget / Decimal::from(open_slots + 1);
        actions.extend(candidates.into_iter().map(|r| OptimizationAction::Add {
            pool_id: r.pool_id.clone(),
            amount: per_slot,
            target_bins: r.suggested_bins.unwrap_or(self.default_target_bins),
        }));
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> AgentConfig {
        let mut config = AgentConfig::new("a", "w");
        config.max_positions = 2;
        config.min_balance = dec!(0.5);
        config.target_health_score = dec!(3.5);
        config
    }

    #[tokio::test]
    async fn test_unrecommended_and_weak_positions_are_unhealthy() {
        let funds = FundsStatus::new(
            dec!(1),
            vec![
                PositionValue::new("gone", dec!(2), dec!(0)),
                PositionValue::new("weak", dec!(2), dec!(0)),
                PositionValue::new("good", dec!(2), dec!(0)),
            ],
        );
        let recs = vec![
            PoolRecommendation::new("weak", dec!(2.9)),
            PoolRecommendation::new("good", dec!(4.2)),
        ];

        let unhealthy = RecommendationOptimizer::default()
            .unhealthy_positions(&config(), &funds, &recs)
            .await
            .unwrap();
        assert_eq!(unhealthy, vec!["gone".to_string(), "weak".to_string()]);
    }

    #[tokio::test]
    async fn test_plan_replaces_unhealthy_with_best_unheld() {
        let funds = FundsStatus::new(
            dec!(0.5),
            vec![
                PositionValue::new("weak", dec!(3), dec!(0)),
                PositionValue::new("good", dec!(3), dec!(0)),
            ],
        );
        let mut best = PoolRecommendation::new("best", dec!(4.8));
        best.suggested_bins = Some(12);
        let recs = vec![
            PoolRecommendation::new("weak", dec!(2.0)),
            PoolRecommendation::new("good", dec!(4.0)),
            PoolRecommendation::new("ok", dec!(3.6)),
            best,
        ];

        let plan = RecommendationOptimizer::default()
            .plan(&config(), &funds, &recs)
            .await
            .unwrap();

        assert_eq!(
            plan,
            vec![
                OptimizationAction::Remove {
                    pool_id: "weak".into()
                },
                OptimizationAction::Add {
                    pool_id: "best".into(),
                    amount: dec!(1.5),
                    target_bins: 12,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_healthy_book_plans_nothing() {
        let funds = FundsStatus::new(
            dec!(0.4),
            vec![
                PositionValue::new("a", dec!(3), dec!(0)),
                PositionValue::new("b", dec!(3), dec!(0)),
            ],
        );
        let recs = vec![
            PoolRecommendation::new("a", dec!(4.0)),
            PoolRecommendation::new("b", dec!(4.1)),
            PoolRecommendation::new("c", dec!(4.9)),
        ];
        let plan = RecommendationOptimizer::default()
            .plan(&config(), &funds, &recs)
            .await
            .unwrap();
        assert!(plan.is_empty());
    }
}
