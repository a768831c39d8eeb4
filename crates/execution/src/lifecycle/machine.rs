//! Per-agent lifecycle state machine with persisted snapshots.

use super::events::StateTransition;
use crate::ports::AgentStateStore;
use chrono::Utc;
use cruise_domain::prelude::*;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// State machine owning one agent's [`AgentStatus`].
///
/// A single mutex covers transition, save and notify, so events for one
/// agent apply strictly one after another and subscribers observe them in
/// the order they were persisted.
pub struct AgentStateMachine {
    agent_id: String,
    status: Mutex<AgentStatus>,
    store: Arc<dyn AgentStateStore>,
    transitions: broadcast::Sender<StateTransition>,
}

impl AgentStateMachine {
    /// Loads the agent's last snapshot, starting in `INITIALIZING` when
    /// none exists or it cannot be read.
    ///
    /// The supplied config replaces any persisted one.
    pub async fn load(
        agent_id: &str,
        config: AgentConfig,
        store: Arc<dyn AgentStateStore>,
        transitions: broadcast::Sender<StateTransition>,
    ) -> Self {
        let status = match store.load(agent_id).await {
            Ok(Some(mut saved)) => {
                info!(agent_id = agent_id, state = %saved.state, "Restored agent state");
                saved.config = config;
                saved
            }
            Ok(None) => AgentStatus::initializing(agent_id, config),
            Err(e) => {
                warn!(agent_id = agent_id, error = %format!("{e:#}"), "Failed to load agent state, starting fresh");
                AgentStatus::initializing(agent_id, config)
            }
        };

        Self {
            agent_id: agent_id.to_string(),
            status: Mutex::new(status),
            store,
            transitions,
        }
    }

    /// Subscribes to this machine's transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions.subscribe()
    }

    /// Agent id.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Current state.
    pub async fn state(&self) -> AgentState {
        self.status.lock().await.state
    }

    /// Copy of the full status.
    pub async fn status(&self) -> AgentStatus {
        self.status.lock().await.clone()
    }

    /// Applies an event. Returns the transition, or `None` when the event
    /// has no effect in the current state.
    pub async fn handle_event(&self, event: AgentEvent) -> Option<StateTransition> {
        let mut status = self.status.lock().await;
        let transition = Self::apply(&mut status, event);
        match &transition {
            Some(_) => self.persist(&status).await,
            None => debug!(agent_id = %self.agent_id, state = %status.state, event = ?event, "Event ignored"),
        }
        self.notify(transition.as_ref());
        transition
    }

    /// Records fresh funds, firing `FUNDS_LOW` below the minimum balance
    /// and `FUNDS_SUFFICIENT` on recovery while waiting.
    pub async fn update_funds(&self, funds: &FundsStatus) -> Option<StateTransition> {
        let mut status = self.status.lock().await;
        let event = if funds.available_balance() < status.config.min_balance {
            Some(AgentEvent::FundsLow)
        } else if status.state == AgentState::Waiting {
            Some(AgentEvent::FundsSufficient)
        } else {
            None
        };

        status.funds = Some(funds.clone());
        let transition = event.and_then(|event| Self::apply(&mut status, event));
        if transition.is_none() {
            status.last_update = Utc::now();
        }
        self.persist(&status).await;
        self.notify(transition.as_ref());
        transition
    }

    /// Stores the latest error message on the status.
    pub async fn record_error(&self, message: impl Into<String>) {
        let mut status = self.status.lock().await;
        status.last_error = Some(message.into());
        status.last_update = Utc::now();
        self.persist(&status).await;
    }

    fn apply(status: &mut AgentStatus, event: AgentEvent) -> Option<StateTransition> {
        let from = status.state;
        let to = from.on_event(event)?;
        let at = Utc::now();
        status.state = to;
        status.last_update = at;
        Some(StateTransition {
            agent_id: status.agent_id.clone(),
            from,
            to,
            event,
            at,
        })
    }

    async fn persist(&self, status: &AgentStatus) {
        if let Err(e) = self.store.save(status).await {
            warn!(
                agent_id = %self.agent_id,
                state = %status.state,
                error = %format!("{e:#}"),
                "Failed to persist agent state, continuing in memory"
            );
        }
    }

    fn notify(&self, transition: Option<&StateTransition>) {
        let Some(transition) = transition else {
            return;
        };
        if transition.is_shutdown() {
            warn!(
                agent_id = %self.agent_id,
                from = %transition.from,
                to = %transition.to,
                event = ?transition.event,
                "Agent state changed"
            );
        } else {
            info!(
                agent_id = %self.agent_id,
                from = %transition.from,
                to = %transition.to,
                event = ?transition.event,
                "Agent state changed"
            );
        }
        // No subscribers is fine.
        let _ = self.transitions.send(transition.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::InMemoryStateStore;
    use rust_decimal_macros::dec;

    async fn machine(store: &Arc<InMemoryStateStore>) -> AgentStateMachine {
        let (tx, _) = broadcast::channel(16);
        let mut config = AgentConfig::new("agent", "wallet");
        config.min_balance = dec!(0.1);
        AgentStateMachine::load("agent", config, store.clone(), tx).await
    }

    #[tokio::test]
    async fn test_fresh_agent_starts_initializing() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = machine(&store).await;
        assert_eq!(machine.state().await, AgentState::Initializing);
    }

    #[tokio::test]
    async fn test_transitions_are_persisted_before_notify() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = machine(&store).await;
        let mut rx = machine.subscribe();

        let transition = machine.handle_event(AgentEvent::Start).await.unwrap();
        assert_eq!(transition.from, AgentState::Initializing);
        assert_eq!(transition.to, AgentState::Running);

        let received = rx.recv().await.unwrap();
        assert_eq!(received, transition);
        let saved = store.snapshot("agent").await.unwrap();
        assert_eq!(saved.state, AgentState::Running);
    }

    #[tokio::test]
    async fn test_noop_events_do_not_notify() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = machine(&store).await;
        let mut rx = machine.subscribe();

        assert!(machine.handle_event(AgentEvent::RiskResolved).await.is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_restores_persisted_state() {
        let store = Arc::new(InMemoryStateStore::new());
        {
            let machine = machine(&store).await;
            machine.handle_event(AgentEvent::Start).await;
            machine.handle_event(AgentEvent::RiskMedium).await;
        }

        let restored = machine(&store).await;
        assert_eq!(restored.state().await, AgentState::PartialReducing);
    }

    #[tokio::test]
    async fn test_funds_low_then_sufficient() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = machine(&store).await;
        machine.handle_event(AgentEvent::Start).await;

        let book = vec![PositionValue::new("pool", dec!(9.95), dec!(0))];
        let low = FundsStatus::new(dec!(0.05), book.clone());
        assert_eq!(low.total_value(), dec!(10));
        let t = machine.update_funds(&low).await.unwrap();
        assert_eq!((t.event, t.to), (AgentEvent::FundsLow, AgentState::Waiting));

        // Still low while waiting changes nothing.
        assert!(machine.update_funds(&low).await.is_none());

        let recovered = FundsStatus::new(dec!(0.2), book);
        let t = machine.update_funds(&recovered).await.unwrap();
        assert_eq!((t.event, t.to), (AgentEvent::FundsSufficient, AgentState::Running));

        let saved = store.snapshot("agent").await.unwrap();
        assert_eq!(saved.funds, Some(recovered));
    }

    #[tokio::test]
    async fn test_save_failure_keeps_transition_in_memory() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = machine(&store).await;
        store.set_fail_writes(true);

        let transition = machine.handle_event(AgentEvent::Start).await;
        assert!(transition.is_some());
        assert_eq!(machine.state().await, AgentState::Running);
        assert!(store.snapshot("agent").await.is_none());

        // The next successful save carries the full snapshot.
        store.set_fail_writes(false);
        machine.record_error("rpc timeout").await;
        let saved = store.snapshot("agent").await.unwrap();
        assert_eq!(saved.state, AgentState::Running);
        assert_eq!(saved.last_error.as_deref(), Some("rpc timeout"));
    }

    #[tokio::test]
    async fn test_concurrent_events_are_serialized() {
        let store = Arc::new(InMemoryStateStore::new());
        let machine = Arc::new(machine(&store).await);
        let mut rx = machine.subscribe();

        let a = {
            let m = Arc::clone(&machine);
            tokio::spawn(async move { m.handle_event(AgentEvent::Start).await })
        };
        let b = {
            let m = Arc::clone(&machine);
            tokio::spawn(async move { m.handle_event(AgentEvent::UserEmergency).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        // Whatever the order, each observed transition starts where the
        // previous one ended.
        let mut previous = AgentState::Initializing;
        while let Ok(t) = rx.try_recv() {
            assert_eq!(t.from, previous);
            previous = t.to;
        }
        assert_eq!(previous, machine.state().await);
        assert_eq!(previous, AgentState::EmergencyExit);
    }
}
