//! Periodic risk assessment and remediation.

use super::escalation::{EscalationWindows, RiskEscalation};
use super::scorer::RiskScorer;
use crate::funds::FundsManager;
use crate::lifecycle::AgentStateMachine;
use crate::transaction::TransactionExecutor;
use chrono::Utc;
use cruise_domain::error::Result;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

/// Configuration for the risk controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskSettings {
    /// Seconds between periodic assessments.
    pub assessment_interval_secs: u64,
    /// Seconds at or below the emergency threshold before escalating.
    pub high_risk_window_secs: u64,
    /// Seconds in the medium range before escalating.
    pub medium_risk_window_secs: u64,
    /// Assessments kept per agent.
    pub history_capacity: usize,
    /// Share of each position withdrawn on medium risk.
    pub partial_reduction_fraction: Decimal,
    /// Retries allowed for each emergency exit transaction.
    pub emergency_max_retries: u32,
}

impl Default for RiskSettings {
    fn default() -> Self {
        Self {
            assessment_interval_secs: 300, // 5 minutes
            high_risk_window_secs: 300,    // 5 minutes
            medium_risk_window_secs: 600,  // 10 minutes
            history_capacity: 100,
            partial_reduction_fraction: Decimal::new(3, 1), // 30%
            emergency_max_retries: 5,
        }
    }
}

impl RiskSettings {
    fn windows(&self) -> EscalationWindows {
        EscalationWindows {
            high: chrono::Duration::seconds(self.high_risk_window_secs as i64),
            medium: chrono::Duration::seconds(self.medium_risk_window_secs as i64),
        }
    }
}

/// Per-agent risk state.
struct AgentRisk {
    config: AgentConfig,
    machine: Arc<AgentStateMachine>,
    escalation: Mutex<RiskEscalation>,
    history: RwLock<VecDeque<RiskAssessment>>,
    assessing: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AgentRisk {
    fn thresholds(&self) -> RiskThresholds {
        RiskThresholds::new(
            self.config.emergency_threshold,
            self.config.medium_risk_threshold,
        )
    }
}

/// Clears the single-flight flag when an assessment ends, however it ends.
struct AssessmentGuard<'a>(&'a AtomicBool);

impl<'a> AssessmentGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AssessmentGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One withdrawal planned by a remediation.
struct Withdrawal {
    pool_id: String,
    payload: TransactionPayload,
    value: Decimal,
}

/// Assesses agents on a timer and reacts to elevated risk.
pub struct RiskController {
    funds: Arc<FundsManager>,
    executor: Arc<TransactionExecutor>,
    scorer: Arc<dyn RiskScorer>,
    /// Configuration.
    settings: RiskSettings,
    /// Risk state by agent id.
    agents: RwLock<HashMap<String, Arc<AgentRisk>>>,
}

impl RiskController {
    /// Creates a new risk controller.
    pub fn new(
        funds: Arc<FundsManager>,
        executor: Arc<TransactionExecutor>,
        scorer: Arc<dyn RiskScorer>,
        settings: RiskSettings,
    ) -> Self {
        Self {
            funds,
            executor,
            scorer,
            settings,
            agents: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an agent and starts its assessment timer.
    pub async fn register_agent(
        self: &Arc<Self>,
        agent_id: &str,
        config: AgentConfig,
        machine: Arc<AgentStateMachine>,
    ) {
        let agent = Arc::new(AgentRisk {
            config,
            machine,
            escalation: Mutex::new(RiskEscalation::new()),
            history: RwLock::new(VecDeque::new()),
            assessing: AtomicBool::new(false),
            timer: Mutex::new(None),
        });

        let period = Duration::from_secs(self.settings.assessment_interval_secs.max(1));
        let handle = Self::spawn_timer(Arc::downgrade(self), agent_id.to_string(), period);
        *agent.timer.lock().await = Some(handle);

        if let Some(previous) = self
            .agents
            .write()
            .await
            .insert(agent_id.to_string(), agent)
        {
            Self::stop_timer(&previous).await;
        }
        info!(agent_id = agent_id, interval_secs = period.as_secs(), "Risk monitoring started");
    }

    /// Stops the agent's timer and forgets its history.
    pub async fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.agents.write().await.remove(agent_id);
        match removed {
            Some(agent) => {
                Self::stop_timer(&agent).await;
                info!(agent_id = agent_id, "Risk monitoring stopped");
                true
            }
            None => false,
        }
    }

    async fn stop_timer(agent: &AgentRisk) {
        if let Some(handle) = agent.timer.lock().await.take() {
            handle.abort();
        }
    }

    fn spawn_timer(controller: Weak<Self>, agent_id: String, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                controller.run_periodic(&agent_id).await;
            }
        })
    }

    async fn run_periodic(&self, agent_id: &str) {
        match self.assess_risk(agent_id).await {
            Ok(assessment) => {
                let result = self.handle_risk(&assessment).await;
                if !result.success {
                    warn!(agent_id = agent_id, message = %result.message, "Risk remediation incomplete");
                }
            }
            Err(CruiseError::AssessmentInProgress(_)) => {
                debug!(agent_id = agent_id, "Assessment still running, skipping tick");
            }
            Err(e) => warn!(agent_id = agent_id, error = %e, "Periodic risk assessment failed"),
        }
    }

    async fn agent(&self, agent_id: &str) -> Result<Arc<AgentRisk>> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))
    }

    /// Scores the agent's current funds and records the assessment.
    ///
    /// Only one assessment per agent runs at a time; an overlapping call
    /// fails with [`CruiseError::AssessmentInProgress`].
    pub async fn assess_risk(&self, agent_id: &str) -> Result<RiskAssessment> {
        let agent = self.agent(agent_id).await?;
        let _guard = AssessmentGuard::acquire(&agent.assessing)
            .ok_or_else(|| CruiseError::AssessmentInProgress(agent_id.to_string()))?;

        let funds = self.funds.get_funds_status(agent_id).await?;
        let (score, triggers) = self.scorer.score(&agent.config, &funds);
        let assessment = RiskAssessment::new(agent_id, Utc::now(), score, agent.thresholds(), triggers);

        debug!(
            agent_id = agent_id,
            health_score = %assessment.health_score,
            risk_level = ?assessment.risk_level,
            triggers = assessment.triggers.len(),
            "Risk assessed"
        );

        let mut history = agent.history.write().await;
        history.push_back(assessment.clone());
        while history.len() > self.settings.history_capacity {
            history.pop_front();
        }
        Ok(assessment)
    }

    /// Feeds an assessment to the escalation windows and runs the
    /// remediation matching its level.
    pub async fn handle_risk(&self, assessment: &RiskAssessment) -> OperationResult {
        let agent_id = assessment.agent_id.as_str();
        let agent = match self.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => return e.into(),
        };

        let state = agent.machine.state().await;
        let event = agent.escalation.lock().await.observe(
            assessment,
            agent.thresholds(),
            self.settings.windows(),
            state,
        );
        if let Some(event) = event {
            info!(agent_id = agent_id, event = ?event, health_score = %assessment.health_score, "Risk escalation");
            agent.machine.handle_event(event).await;
        }

        match assessment.risk_level {
            RiskLevel::High | RiskLevel::Critical => self.execute_emergency_exit(agent_id).await,
            RiskLevel::Medium => {
                self.execute_partial_reduction(agent_id, self.settings.partial_reduction_fraction)
                    .await
            }
            RiskLevel::Low => OperationResult::ok("risk low, no action needed"),
        }
    }

    /// Withdraws every open position at critical priority.
    pub async fn execute_emergency_exit(&self, agent_id: &str) -> OperationResult {
        warn!(agent_id = agent_id, "Executing emergency exit");
        let max_retries = Some(self.settings.emergency_max_retries);
        self.withdraw(agent_id, TransactionPriority::Critical, max_retries, |p| {
            Withdrawal {
                pool_id: p.pool_id.clone(),
                payload: TransactionPayload::EmergencyExit {
                    pool_ids: vec![p.pool_id.clone()],
                },
                value: p.value_native,
            }
        })
        .await
    }

    /// Withdraws `fraction` of every open position at high priority.
    pub async fn execute_partial_reduction(
        &self,
        agent_id: &str,
        fraction: Decimal,
    ) -> OperationResult {
        let fraction = fraction.clamp(Decimal::ZERO, Decimal::ONE);
        info!(agent_id = agent_id, fraction = %fraction, "Executing partial reduction");
        self.withdraw(agent_id, TransactionPriority::High, None, |p| Withdrawal {
            pool_id: p.pool_id.clone(),
            payload: TransactionPayload::RemoveLiquidity {
                pool_id: p.pool_id.clone(),
                fraction,
            },
            value: p.value_native * fraction,
        })
        .await
    }

    async fn withdraw<F>(
        &self,
        agent_id: &str,
        priority: TransactionPriority,
        max_retries: Option<u32>,
        plan: F,
    ) -> OperationResult
    where
        F: Fn(&PositionValue) -> Withdrawal,
    {
        let agent = match self.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => return e.into(),
        };
        let funds = match self.funds.get_funds_status(agent_id).await {
            Ok(funds) => funds,
            Err(e) => {
                error!(agent_id = agent_id, error = %e, "Cannot read positions for remediation");
                return e.into();
            }
        };

        let withdrawals: Vec<Withdrawal> = funds.positions().iter().map(plan).collect();
        if withdrawals.is_empty() {
            return OperationResult::ok("no open positions");
        }
        let planned = withdrawals.len();

        let mut set = JoinSet::new();
        for w in withdrawals {
            let executor = Arc::clone(&self.executor);
            let agent_id = agent_id.to_string();
            let wallet_id = agent.config.wallet_id.clone();
            set.spawn(async move {
                let result = executor
                    .submit(&agent_id, &wallet_id, w.payload, priority, max_retries)
                    .await;
                (w.pool_id, w.value, result)
            });
        }

        let mut succeeded = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((pool_id, value, result)) if result.success => {
                    succeeded += 1;
                    if let Err(e) = self
                        .funds
                        .record_transaction(agent_id, value, FundsFlow::RemoveLiquidity)
                        .await
                    {
                        warn!(agent_id = agent_id, pool_id = %pool_id, error = %e, "Failed to record withdrawal");
                    }
                }
                Ok((pool_id, _, result)) => {
                    error!(
                        agent_id = agent_id,
                        pool_id = %pool_id,
                        request_id = %result.request_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Withdrawal failed"
                    );
                }
                Err(e) => error!(agent_id = agent_id, error = %e, "Withdrawal task aborted"),
            }
        }
        self.funds.invalidate(agent_id).await;

        let failed = planned - succeeded;
        info!(agent_id = agent_id, planned = planned, succeeded = succeeded, failed = failed, "Remediation finished");
        if failed == 0 {
            OperationResult::ok(format!("withdrew from {succeeded} positions"))
        } else {
            OperationResult::failed(
                ErrorKind::Unrecoverable,
                format!("{failed} of {planned} withdrawals failed"),
            )
        }
    }

    /// Recorded assessments, oldest first.
    pub async fn risk_history(&self, agent_id: &str) -> Vec<RiskAssessment> {
        match self.agent(agent_id).await {
            Ok(agent) => agent.history.read().await.iter().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Most recent assessment.
    pub async fn latest_assessment(&self, agent_id: &str) -> Option<RiskAssessment> {
        let agent = self.agent(agent_id).await.ok()?;
        let history = agent.history.read().await;
        history.back().cloned()
    }

    /// Whether a timer is running for the agent.
    pub async fn is_monitoring(&self, agent_id: &str) -> bool {
        match self.agent(agent_id).await {
            Ok(agent) => agent
                .timer
                .lock()
                .await
                .as_ref()
                .is_some_and(|h| !h.is_finished()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funds::FundsSettings;
    use crate::lifecycle::StateTransition;
    use crate::risk::DefaultRiskScorer;
    use crate::testkit::{InMemoryStateStore, MockChain};
    use crate::transaction::ExecutorSettings;
    use rust_decimal_macros::dec;
    use tokio::sync::broadcast;

    const WALLET: &str = "wallet-1";

    struct Harness {
        chain: Arc<MockChain>,
        funds: Arc<FundsManager>,
        machine: Arc<AgentStateMachine>,
        controller: Arc<RiskController>,
    }

    async fn harness(settings: RiskSettings) -> Harness {
        let chain = Arc::new(MockChain::new());
        let funds = Arc::new(FundsManager::new(
            chain.clone(),
            chain.clone(),
            FundsSettings::default(),
        ));
        let executor = Arc::new(TransactionExecutor::new(
            chain.clone(),
            chain.clone(),
            chain.clone(),
            ExecutorSettings::default(),
        ));
        let controller = Arc::new(RiskController::new(
            funds.clone(),
            executor,
            Arc::new(DefaultRiskScorer::default()),
            settings,
        ));

        let config = AgentConfig::new("agent", WALLET);
        let (tx, _) = broadcast::channel::<StateTransition>(16);
        let machine = Arc::new(
            AgentStateMachine::load("agent", config.clone(), Arc::new(InMemoryStateStore::new()), tx)
                .await,
        );
        machine.handle_event(AgentEvent::Start).await;
        funds.register_agent("agent", &config, None).await;
        controller
            .register_agent("agent", config, machine.clone())
            .await;

        Harness {
            chain,
            funds,
            machine,
            controller,
        }
    }

    fn sample(minute: i64, score: Decimal, start: chrono::DateTime<Utc>) -> RiskAssessment {
        RiskAssessment::new(
            "agent",
            start + chrono::Duration::minutes(minute),
            score,
            RiskThresholds::new(dec!(1.5), dec!(2.5)),
            vec![],
        )
    }

    #[tokio::test]
    async fn test_assess_risk_records_history() {
        let h = harness(RiskSettings::default()).await;
        h.chain.set_balance(WALLET, dec!(10)).await;

        let assessment = h.controller.assess_risk("agent").await.unwrap();
        assert_eq!(assessment.risk_level, RiskLevel::Low);
        assert_eq!(h.controller.risk_history("agent").await.len(), 1);
        assert_eq!(h.controller.latest_assessment("agent").await, Some(assessment));
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let settings = RiskSettings {
            history_capacity: 3,
            ..Default::default()
        };
        let h = harness(settings).await;
        for _ in 0..5 {
            h.controller.assess_risk("agent").await.unwrap();
        }
        assert_eq!(h.controller.risk_history("agent").await.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_assessment_is_rejected() {
        let h = harness(RiskSettings::default()).await;
        let agent = h.controller.agent("agent").await.unwrap();

        let _held = AssessmentGuard::acquire(&agent.assessing).unwrap();
        let err = h.controller.assess_risk("agent").await.unwrap_err();
        assert!(matches!(err, CruiseError::AssessmentInProgress(_)));
        drop(_held);

        assert!(h.controller.assess_risk("agent").await.is_ok());
    }

    #[tokio::test]
    async fn test_sustained_high_risk_exits_once() {
        let h = harness(RiskSettings::default()).await;
        h.chain
            .set_positions(WALLET, vec![PositionValue::new("pool-a", dec!(5), dec!(750))])
            .await;
        let mut transitions = h.machine.subscribe();
        let start = Utc::now();

        for minute in 0..5 {
            h.controller.handle_risk(&sample(minute, dec!(1.0), start)).await;
            assert_eq!(h.machine.state().await, AgentState::Running);
        }
        h.controller.handle_risk(&sample(5, dec!(1.0), start)).await;
        assert_eq!(h.machine.state().await, AgentState::EmergencyExit);

        h.controller.handle_risk(&sample(6, dec!(1.0), start)).await;
        let mut exits = 0;
        while let Ok(t) = transitions.try_recv() {
            if t.to == AgentState::EmergencyExit {
                exits += 1;
            }
        }
        assert_eq!(exits, 1);
    }

    #[tokio::test]
    async fn test_emergency_exit_covers_every_position() {
        let h = harness(RiskSettings::default()).await;
        h.chain
            .set_positions(
                WALLET,
                vec![
                    PositionValue::new("pool-a", dec!(2), dec!(300)),
                    PositionValue::new("pool-b", dec!(3), dec!(450)),
                ],
            )
            .await;

        let result = h.controller.execute_emergency_exit("agent").await;
        assert!(result.success, "{}", result.message);

        let mut exited: Vec<Vec<String>> = h
            .chain
            .built()
            .await
            .into_iter()
            .filter_map(|p| match p {
                TransactionPayload::EmergencyExit { pool_ids } => Some(pool_ids),
                _ => None,
            })
            .collect();
        exited.sort();
        assert_eq!(exited, vec![vec!["pool-a".to_string()], vec!["pool-b".to_string()]]);

        let ledger = h.funds.ledger("agent").await;
        let total: Decimal = ledger.iter().map(|r| r.amount).sum();
        assert_eq!(total, dec!(5));
        assert!(ledger.iter().all(|r| r.flow == FundsFlow::RemoveLiquidity));
    }

    #[tokio::test]
    async fn test_medium_risk_reduces_positions_by_fraction() {
        let h = harness(RiskSettings::default()).await;
        h.chain
            .set_positions(WALLET, vec![PositionValue::new("pool-a", dec!(4), dec!(600))])
            .await;

        let result = h.controller.handle_risk(&sample(0, dec!(2.0), Utc::now())).await;
        assert!(result.success);
        assert_eq!(
            h.chain.built().await,
            vec![TransactionPayload::RemoveLiquidity {
                pool_id: "pool-a".into(),
                fraction: dec!(0.3),
            }]
        );
        // Debounced: a single medium sample does not change state.
        assert_eq!(h.machine.state().await, AgentState::Running);
    }

    #[tokio::test]
    async fn test_failed_withdrawal_is_counted_not_fatal() {
        let h = harness(RiskSettings {
            emergency_max_retries: 0,
            ..Default::default()
        })
        .await;
        h.chain
            .set_positions(
                WALLET,
                vec![
                    PositionValue::new("pool-a", dec!(2), dec!(300)),
                    PositionValue::new("pool-b", dec!(3), dec!(450)),
                ],
            )
            .await;
        h.chain.fail_next_sends(1);

        let result = h.controller.execute_emergency_exit("agent").await;
        assert!(!result.success);
        assert_eq!(result.message, "1 of 2 withdrawals failed");
        assert_eq!(h.funds.ledger("agent").await.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_stops_timer() {
        let h = harness(RiskSettings::default()).await;
        assert!(h.controller.is_monitoring("agent").await);

        assert!(h.controller.unregister_agent("agent").await);
        assert!(!h.controller.is_monitoring("agent").await);
        assert!(!h.controller.unregister_agent("agent").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_assesses_periodically() {
        let h = harness(RiskSettings::default()).await;
        h.chain.set_balance(WALLET, dec!(10)).await;

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(h.controller.risk_history("agent").await.len(), 1);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(h.controller.risk_history("agent").await.len(), 2);
    }
}
