//! In-process run metrics.

use crate::ports::MetricsSink;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Counters for one agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgentMetrics {
    pub health_checks: u64,
    pub health_check_failures: u64,
    pub last_health_check_ms: u64,
    pub avg_health_check_ms: f64,
    pub optimizations: u64,
    pub actions_planned: u64,
    pub actions_succeeded: u64,
    pub last_optimization_ms: u64,
}

/// Metrics for every agent plus totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_health_checks: u64,
    pub total_optimizations: u64,
    pub agents: BTreeMap<String, AgentMetrics>,
}

/// [`MetricsSink`] that keeps counters in memory for the REST surface.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    agents: RwLock<BTreeMap<String, AgentMetrics>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let agents = self
            .agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        MetricsSnapshot {
            total_health_checks: agents.values().map(|m| m.health_checks).sum(),
            total_optimizations: agents.values().map(|m| m.optimizations).sum(),
            agents,
        }
    }

    pub fn agent(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    pub fn remove(&self, agent_id: &str) {
        self.agents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id);
    }

    fn update(&self, agent_id: &str, f: impl FnOnce(&mut AgentMetrics)) {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        f(agents.entry(agent_id.to_string()).or_default());
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_health_check(&self, agent_id: &str, duration: Duration, success: bool) {
        let ms = duration.as_millis() as u64;
        self.update(agent_id, |m| {
            m.health_checks += 1;
            if !success {
                m.health_check_failures += 1;
            }
            m.last_health_check_ms = ms;
            // Running mean.
            m.avg_health_check_ms += (ms as f64 - m.avg_health_check_ms) / m.health_checks as f64;
        });
    }

    fn record_optimization(
        &self,
        agent_id: &str,
        duration: Duration,
        planned: usize,
        succeeded: usize,
    ) {
        self.update(agent_id, |m| {
            m.optimizations += 1;
            m.actions_planned += planned as u64;
            m.actions_succeeded += succeeded as u64;
            m.last_optimization_ms = duration.as_millis() as u64;
        });
    }
}
