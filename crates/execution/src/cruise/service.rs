//! The orchestrator tying scheduler, funds, risk and execution together.

use super::config::{CruiseConfig, CruiseSettings};
use crate::funds::{FundsManager, FundsSafetyAlert};
use crate::lifecycle::{AgentStateMachine, StateTransition};
use crate::metrics::{AgentMetrics, InMemoryMetrics, MetricsSnapshot};
use crate::ports::{
    AgentStateStore, MetricsSink, PositionOptimizer, PositionReader, RecommendationSource,
    TransactionBuilder, TransactionSender, TransactionSigner, WalletReader,
};
use crate::risk::{DefaultRiskScorer, RiskController, RiskScorer};
use crate::scheduler::{ScheduledTaskManager, TaskHandler, task_handler};
use crate::transaction::TransactionExecutor;
use cruise_domain::error::Result;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Collaborators injected into the service.
#[derive(Clone)]
pub struct CruisePorts {
    pub wallet: Arc<dyn WalletReader>,
    pub positions: Arc<dyn PositionReader>,
    pub builder: Arc<dyn TransactionBuilder>,
    pub signer: Arc<dyn TransactionSigner>,
    pub sender: Arc<dyn TransactionSender>,
    pub recommendations: Arc<dyn RecommendationSource>,
    pub optimizer: Arc<dyn PositionOptimizer>,
    pub store: Arc<dyn AgentStateStore>,
    /// Extra sink fed alongside the built-in in-memory metrics.
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Scorer used by the risk controller; the default scorer when unset.
    pub scorer: Option<Arc<dyn RiskScorer>>,
}

/// Overview of the whole service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub scheduler_running: bool,
    pub scheduled_tasks: usize,
    pub agents: Vec<AgentStatus>,
}

/// A registered agent.
struct ManagedAgent {
    config: CruiseConfig,
    machine: Arc<AgentStateMachine>,
}

/// Orchestrates every registered agent.
pub struct CruiseService {
    settings: CruiseSettings,
    recommendations: Arc<dyn RecommendationSource>,
    optimizer: Arc<dyn PositionOptimizer>,
    store: Arc<dyn AgentStateStore>,
    scheduler: Arc<ScheduledTaskManager>,
    funds: Arc<FundsManager>,
    executor: Arc<TransactionExecutor>,
    risk: Arc<RiskController>,
    metrics: Arc<InMemoryMetrics>,
    extra_metrics: Option<Arc<dyn MetricsSink>>,
    /// Registered agents by id.
    agents: RwLock<HashMap<String, Arc<ManagedAgent>>>,
    transitions: broadcast::Sender<StateTransition>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CruiseService {
    /// Builds the engine from its ports.
    ///
    /// Must be called inside a Tokio runtime: the funds safety consumer is
    /// spawned immediately.
    pub fn new(ports: CruisePorts, settings: CruiseSettings) -> Arc<Self> {
        let funds = Arc::new(FundsManager::new(
            ports.wallet,
            ports.positions,
            settings.funds.clone(),
        ));
        let executor = Arc::new(TransactionExecutor::new(
            ports.builder,
            ports.signer,
            ports.sender,
            settings.executor.clone(),
        ));
        let scorer = ports
            .scorer
            .unwrap_or_else(|| Arc::new(DefaultRiskScorer::default()));
        let risk = Arc::new(RiskController::new(
            Arc::clone(&funds),
            Arc::clone(&executor),
            scorer,
            settings.risk.clone(),
        ));
        let (transitions, _) = broadcast::channel(256);

        let service = Arc::new(Self {
            settings,
            recommendations: ports.recommendations,
            optimizer: ports.optimizer,
            store: ports.store,
            scheduler: Arc::new(ScheduledTaskManager::new()),
            funds,
            executor,
            risk,
            metrics: Arc::new(InMemoryMetrics::new()),
            extra_metrics: ports.metrics,
            agents: RwLock::new(HashMap::new()),
            transitions,
            scheduler_handle: Mutex::new(None),
        });
        service.spawn_safety_consumer();
        service
    }

    fn spawn_safety_consumer(self: &Arc<Self>) {
        let mut alerts = self.funds.subscribe_safety();
        let service = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match alerts.recv().await {
                    Ok(alert) => {
                        let Some(service) = service.upgrade() else {
                            break;
                        };
                        service.on_safety_alert(alert).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Funds safety consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    async fn on_safety_alert(&self, alert: FundsSafetyAlert) {
        if let Ok(agent) = self.agent(&alert.agent_id).await {
            agent
                .machine
                .record_error(format!(
                    "available balance {} below emergency reserve {}",
                    alert.available_balance, alert.emergency_reserve
                ))
                .await;
        }
    }

    /// Starts the scheduler loop.
    pub async fn start(&self) {
        let mut handle = self.scheduler_handle.lock().await;
        if handle.is_none() {
            *handle = Some(self.scheduler.start());
            info!("Cruise service started");
        }
    }

    /// Stops the scheduler and every risk timer. Agent state stays persisted.
    pub async fn shutdown(&self) {
        self.scheduler.stop();
        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            handle.abort();
        }
        let ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        for id in &ids {
            self.risk.unregister_agent(id).await;
        }
        info!(agents = ids.len(), "Cruise service stopped");
    }

    /// Subscribes to state transitions of every agent.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Task scheduler.
    pub fn scheduler(&self) -> &Arc<ScheduledTaskManager> {
        &self.scheduler
    }

    /// Funds manager.
    pub fn funds(&self) -> &Arc<FundsManager> {
        &self.funds
    }

    /// Risk controller.
    pub fn risk(&self) -> &Arc<RiskController> {
        &self.risk
    }

    /// Transaction executor.
    pub fn executor(&self) -> &Arc<TransactionExecutor> {
        &self.executor
    }

    async fn agent(&self, agent_id: &str) -> Result<Arc<ManagedAgent>> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))
    }

    /// Registers an agent, schedules its tasks and runs a first health
    /// check. Registering an id twice is a no-op.
    pub async fn register_agent(
        self: &Arc<Self>,
        agent_id: &str,
        config: AgentConfig,
    ) -> OperationResult {
        let cruise_config = match CruiseConfig::merge(agent_id, config, &self.settings.defaults) {
            Ok(config) => config,
            Err(e) => {
                error!(agent_id = agent_id, error = %e, "Rejecting agent registration");
                return e.into();
            }
        };

        let agent = {
            let mut agents = self.agents.write().await;
            if agents.contains_key(agent_id) {
                debug!(agent_id = agent_id, "Agent already registered");
                return OperationResult::ok(format!("agent {agent_id} already registered"));
            }

            let machine = Arc::new(
                AgentStateMachine::load(
                    agent_id,
                    cruise_config.agent.clone(),
                    Arc::clone(&self.store),
                    self.transitions.clone(),
                )
                .await,
            );
            let agent = Arc::new(ManagedAgent {
                config: cruise_config,
                machine,
            });
            agents.insert(agent_id.to_string(), Arc::clone(&agent));
            agent
        };

        let seed = agent.machine.status().await.funds;
        self.funds
            .register_agent(agent_id, &agent.config.agent, seed)
            .await;
        self.risk
            .register_agent(
                agent_id,
                agent.config.agent.clone(),
                Arc::clone(&agent.machine),
            )
            .await;
        self.schedule_agent_tasks(&agent.config).await;

        if agent.machine.state().await == AgentState::Initializing {
            agent.machine.handle_event(AgentEvent::Start).await;
        }

        info!(
            agent_id = agent_id,
            wallet = %agent.config.agent.wallet_id,
            state = %agent.machine.state().await,
            "Agent registered"
        );

        let first_check = self.health_check(agent_id).await;
        if !first_check.success {
            warn!(agent_id = agent_id, message = %first_check.message, "Initial health check failed");
        }
        OperationResult::ok(format!("agent {agent_id} registered"))
    }

    async fn schedule_agent_tasks(self: &Arc<Self>, config: &CruiseConfig) {
        let id = &config.agent_id;
        let tags = vec![config.tag()];

        self.scheduler
            .schedule_recurring(
                format!("health-check:{id}"),
                config.health_check_interval,
                tags.clone(),
                self.agent_task(id, |service, agent_id| async move {
                    service.health_check(&agent_id).await
                }),
            )
            .await;
        self.scheduler
            .schedule_recurring(
                format!("market-check:{id}"),
                config.market_check_interval,
                tags.clone(),
                self.agent_task(id, |service, agent_id| async move {
                    service.market_change_check(&agent_id).await
                }),
            )
            .await;
        self.scheduler
            .schedule_recurring(
                format!("optimization:{id}"),
                config.optimization_interval,
                tags,
                self.agent_task(id, |service, agent_id| async move {
                    service.optimize(&agent_id).await
                }),
            )
            .await;
    }

    /// Wraps an operation into a scheduler handler holding only a weak
    /// reference to the service.
    fn agent_task<F, Fut>(self: &Arc<Self>, agent_id: &str, op: F) -> TaskHandler
    where
        F: Fn(Arc<Self>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationResult> + Send + 'static,
    {
        let service: Weak<Self> = Arc::downgrade(self);
        let agent_id = agent_id.to_string();
        let op = Arc::new(op);
        task_handler(move || {
            let service = service.clone();
            let agent_id = agent_id.clone();
            let op = Arc::clone(&op);
            async move {
                let Some(service) = service.upgrade() else {
                    return Ok(());
                };
                let result = op(service, agent_id).await;
                if result.success {
                    Ok(())
                } else {
                    anyhow::bail!(result.message)
                }
            }
        })
    }

    /// Cancels the agent's tasks, stops its risk timer and marks it stopped.
    pub async fn unregister_agent(&self, agent_id: &str) -> OperationResult {
        let Some(agent) = self.agents.write().await.remove(agent_id) else {
            return CruiseError::AgentNotRegistered(agent_id.to_string()).into();
        };

        let cancelled = self.scheduler.cancel_by_tag(&agent.config.tag()).await;
        self.risk.unregister_agent(agent_id).await;
        agent.machine.handle_event(AgentEvent::Stop).await;
        self.funds.unregister_agent(agent_id).await;
        self.metrics.remove(agent_id);

        info!(agent_id = agent_id, cancelled_tasks = cancelled, "Agent unregistered");
        OperationResult::ok(format!("agent {agent_id} unregistered"))
    }

    /// Fires `START` and resumes the agent's scheduled tasks.
    pub async fn start_agent(&self, agent_id: &str) -> OperationResult {
        let agent = match self.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => return e.into(),
        };
        self.scheduler.enable_by_tag(&agent.config.tag()).await;
        Self::transition_result(&agent, AgentEvent::Start).await
    }

    /// Fires `STOP` and pauses the agent's scheduled tasks.
    pub async fn stop_agent(&self, agent_id: &str) -> OperationResult {
        let agent = match self.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => return e.into(),
        };
        self.scheduler.disable_by_tag(&agent.config.tag()).await;
        Self::transition_result(&agent, AgentEvent::Stop).await
    }

    async fn transition_result(agent: &ManagedAgent, event: AgentEvent) -> OperationResult {
        match agent.machine.handle_event(event).await {
            Some(t) => OperationResult::ok(format!("{} -> {}", t.from, t.to)),
            None => OperationResult::ok(format!(
                "agent {} already {}",
                agent.config.agent_id,
                agent.machine.state().await
            )),
        }
    }

    /// Fires `USER_EMERGENCY` and withdraws every position.
    pub async fn emergency_stop(&self, agent_id: &str) -> OperationResult {
        let agent = match self.agent(agent_id).await {
            Ok(agent) => agent,
            Err(e) => return e.into(),
        };
        warn!(agent_id = agent_id, "Emergency stop requested");
        agent.machine.handle_event(AgentEvent::UserEmergency).await;
        self.risk.execute_emergency_exit(agent_id).await
    }

    /// Refreshes funds and risk, fills free slots and reworks unhealthy
    /// positions.
    pub async fn health_check(&self, agent_id: &str) -> OperationResult {
        let started = Instant::now();
        let result = self.run_health_check(agent_id).await;
        let elapsed = started.elapsed();

        if let Err(CruiseError::AgentNotRegistered(_)) = &result {
            return result.map(OperationResult::ok).into();
        }
        self.metrics
            .record_health_check(agent_id, elapsed, result.is_ok());
        if let Some(sink) = &self.extra_metrics {
            sink.record_health_check(agent_id, elapsed, result.is_ok());
        }

        if let Err(e) = &result {
            warn!(agent_id = agent_id, error = %e, "Health check failed");
            if let Ok(agent) = self.agent(agent_id).await {
                agent.machine.record_error(e.to_string()).await;
            }
        }
        result.map(OperationResult::ok).into()
    }

    async fn run_health_check(&self, agent_id: &str) -> Result<String> {
        let agent = self.agent(agent_id).await?;
        let config = &agent.config.agent;

        let funds = self.funds.get_funds_status(agent_id).await?;
        agent.machine.update_funds(&funds).await;

        // A running periodic assessment already holds the slot; report its
        // predecessor instead of waiting.
        let assessment = match self.risk.assess_risk(agent_id).await {
            Ok(assessment) => Some(assessment),
            Err(CruiseError::AssessmentInProgress(_)) => self.risk.latest_assessment(agent_id).await,
            Err(e) => {
                warn!(agent_id = agent_id, error = %e, "Risk assessment failed during health check");
                None
            }
        };
        let risk = match &assessment {
            Some(a) => {
                debug!(
                    agent_id = agent_id,
                    health_score = %a.health_score,
                    risk_level = ?a.risk_level,
                    "Health check risk snapshot"
                );
                format!("risk {:?} at {}", a.risk_level, a.health_score).to_lowercase()
            }
            None => "risk unknown".to_string(),
        };

        let state = agent.machine.state().await;
        if state != AgentState::Running {
            return Ok(format!("agent is {state}, {risk}, skipping fill and optimization"));
        }

        let recommendations = self
            .recommendations
            .recommended_pools()
            .await
            .map_err(CruiseError::collaborator)?;

        let mut opened = 0;
        if funds.positions().len() < config.max_positions
            && funds.available_balance() >= config.min_balance
        {
            opened = self.fill_positions(&agent, &funds, &recommendations).await;
        }

        let unhealthy = self
            .optimizer
            .unhealthy_positions(config, &funds, &recommendations)
            .await
            .map_err(CruiseError::collaborator)?;
        if !unhealthy.is_empty() {
            info!(agent_id = agent_id, unhealthy = ?unhealthy, "Unhealthy positions found");
            let result = self.optimize(agent_id).await;
            if !result.success {
                warn!(agent_id = agent_id, message = %result.message, "Optimization after health check incomplete");
            }
        }

        Ok(format!(
            "health check complete: {risk}, {opened} opened, {} unhealthy",
            unhealthy.len()
        ))
    }

    /// Opens positions in the best unheld recommended pools, splitting the
    /// available balance evenly across free slots with one share held back.
    async fn fill_positions(
        &self,
        agent: &ManagedAgent,
        funds: &FundsStatus,
        recommendations: &[PoolRecommendation],
    ) -> usize {
        let agent_id = agent.config.agent_id.as_str();
        let open_slots = agent
            .config
            .agent
            .max_positions
            .saturating_sub(funds.positions().len());
        if open_slots == 0 {
            return 0;
        }

        let mut candidates: Vec<&PoolRecommendation> = recommendations
            .iter()
            .filter(|r| !funds.holds_pool(&r.pool_id))
            .collect();
        candidates.sort_by(|a, b| b.health_score.cmp(&a.health_score));
        candidates.truncate(open_slots);

        let per_slot = funds.available_balance() / Decimal::from(open_slots + 1);
        let mut opened = 0;
        for rec in candidates {
            if !self
                .funds
                .check_transaction_limit(agent_id, per_slot, FundsFlow::AddLiquidity)
                .await
            {
                info!(agent_id = agent_id, pool_id = %rec.pool_id, amount = %per_slot, "Fill skipped by limits");
                continue;
            }

            let payload = TransactionPayload::AddLiquidity {
                pool_id: rec.pool_id.clone(),
                amount: per_slot,
                target_bins: rec
                    .suggested_bins
                    .unwrap_or(self.settings.defaults.default_target_bins),
            };
            let result = self
                .executor
                .submit(
                    agent_id,
                    &agent.config.agent.wallet_id,
                    payload,
                    TransactionPriority::Medium,
                    None,
                )
                .await;

            if result.success {
                opened += 1;
                self.record(agent_id, per_slot, FundsFlow::AddLiquidity).await;
                info!(agent_id = agent_id, pool_id = %rec.pool_id, amount = %per_slot, "Position opened");
            } else {
                warn!(
                    agent_id = agent_id,
                    pool_id = %rec.pool_id,
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Failed to open position"
                );
            }
        }
        opened
    }

    async fn record(&self, agent_id: &str, amount: Decimal, flow: FundsFlow) {
        if let Err(e) = self.funds.record_transaction(agent_id, amount, flow).await {
            warn!(agent_id = agent_id, error = %e, "Failed to record transaction");
        }
        self.funds.invalidate(agent_id).await;
    }

    /// Executes the optimizer's plan. Succeeds only if every action does.
    pub async fn optimize(&self, agent_id: &str) -> OperationResult {
        let started = Instant::now();
        let (result, planned, succeeded) = match self.run_optimize(agent_id).await {
            Ok((planned, succeeded)) => {
                let result = if succeeded == planned {
                    OperationResult::ok(format!("{succeeded} of {planned} actions succeeded"))
                } else {
                    OperationResult::failed(
                        ErrorKind::Unrecoverable,
                        format!("{succeeded} of {planned} actions succeeded"),
                    )
                };
                (result, planned, succeeded)
            }
            Err(e @ CruiseError::AgentNotRegistered(_)) => return e.into(),
            Err(e) => {
                warn!(agent_id = agent_id, error = %e, "Optimization failed");
                (e.into(), 0, 0)
            }
        };

        let elapsed = started.elapsed();
        self.metrics
            .record_optimization(agent_id, elapsed, planned, succeeded);
        if let Some(sink) = &self.extra_metrics {
            sink.record_optimization(agent_id, elapsed, planned, succeeded);
        }
        result
    }

    async fn run_optimize(&self, agent_id: &str) -> Result<(usize, usize)> {
        let agent = self.agent(agent_id).await?;
        let config = &agent.config.agent;
        let funds = self.funds.get_funds_status(agent_id).await?;
        let recommendations = self
            .recommendations
            .recommended_pools()
            .await
            .map_err(CruiseError::collaborator)?;
        let plan = self
            .optimizer
            .plan(config, &funds, &recommendations)
            .await
            .map_err(CruiseError::collaborator)?;

        if plan.is_empty() {
            debug!(agent_id = agent_id, "Nothing to optimize");
            return Ok((0, 0));
        }
        info!(agent_id = agent_id, actions = plan.len(), "Executing optimization plan");

        let mut succeeded = 0;
        for action in &plan {
            let payload = action.to_payload();
            let flow = FundsFlow::from(payload.tx_type());
            let amount = match (&payload, funds.positions().iter().find(|p| p.pool_id == action.pool_id())) {
                (TransactionPayload::RemoveLiquidity { fraction, .. }, Some(position)) => {
                    position.value_native * *fraction
                }
                _ => payload.outflow_amount().unwrap_or_default(),
            };

            if payload.outflow_amount().is_some()
                && !self.funds.check_transaction_limit(agent_id, amount, flow).await
            {
                warn!(agent_id = agent_id, pool_id = %action.pool_id(), "Action denied by limits");
                continue;
            }

            let result = self
                .executor
                .submit(
                    agent_id,
                    &config.wallet_id,
                    payload,
                    TransactionPriority::Medium,
                    None,
                )
                .await;
            if result.success {
                succeeded += 1;
                self.record(agent_id, amount, flow).await;
            } else {
                warn!(
                    agent_id = agent_id,
                    pool_id = %action.pool_id(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "Optimization action failed"
                );
            }
        }
        Ok((plan.len(), succeeded))
    }

    /// Reacts to changes in the recommended set: reoptimizes when a held
    /// pool dropped out, fills when a clearly better pool appeared.
    pub async fn market_change_check(&self, agent_id: &str) -> OperationResult {
        match self.run_market_check(agent_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(agent_id = agent_id, error = %e, "Market change check failed");
                e.into()
            }
        }
    }

    async fn run_market_check(&self, agent_id: &str) -> Result<OperationResult> {
        let agent = self.agent(agent_id).await?;
        let config = &agent.config.agent;
        let funds = self.funds.get_funds_status(agent_id).await?;
        let recommendations = self
            .recommendations
            .recommended_pools()
            .await
            .map_err(CruiseError::collaborator)?;

        let recommended: HashSet<&str> = recommendations
            .iter()
            .map(|r| r.pool_id.as_str())
            .collect();
        if let Some(dropped) = funds
            .positions()
            .iter()
            .find(|p| !recommended.contains(p.pool_id.as_str()))
        {
            info!(agent_id = agent_id, pool_id = %dropped.pool_id, "Held pool no longer recommended");
            return Ok(self.optimize(agent_id).await);
        }

        if agent.machine.state().await != AgentState::Running
            || funds.positions().len() >= config.max_positions
            || funds.available_balance() < config.min_balance
        {
            return Ok(OperationResult::ok("no market action"));
        }

        let best_held = recommendations
            .iter()
            .filter(|r| funds.holds_pool(&r.pool_id))
            .map(|r| r.health_score)
            .max();
        let bar = match best_held {
            Some(best) => best + self.settings.defaults.improvement_margin,
            None => config.target_health_score,
        };
        let better = recommendations
            .iter()
            .any(|r| !funds.holds_pool(&r.pool_id) && r.health_score >= bar);
        if !better {
            return Ok(OperationResult::ok("no market action"));
        }

        let opened = self.fill_positions(&agent, &funds, &recommendations).await;
        Ok(OperationResult::ok(format!("opened {opened} positions")))
    }

    /// Status of the service and every agent.
    pub async fn status(&self) -> ServiceStatus {
        let agents: Vec<Arc<ManagedAgent>> = self.agents.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(agents.len());
        for agent in agents {
            statuses.push(agent.machine.status().await);
        }
        statuses.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        ServiceStatus {
            scheduler_running: self.scheduler.is_running(),
            scheduled_tasks: self.scheduler.len().await,
            agents: statuses,
        }
    }

    /// Status of one agent.
    pub async fn agent_status(&self, agent_id: &str) -> Option<AgentStatus> {
        let agent = self.agent(agent_id).await.ok()?;
        Some(agent.machine.status().await)
    }

    /// Metrics of every agent.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Metrics of one agent, `None` until it has recorded anything.
    pub fn agent_metrics(&self, agent_id: &str) -> Option<AgentMetrics> {
        self.metrics.agent(agent_id)
    }

    /// Whether an agent is registered.
    pub async fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    /// Ids of registered agents.
    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Interval the scheduler uses for the agent's health checks.
    pub async fn health_check_interval(&self, agent_id: &str) -> Option<Duration> {
        let agent = self.agent(agent_id).await.ok()?;
        Some(agent.config.health_check_interval)
    }
}
