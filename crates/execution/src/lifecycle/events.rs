//! Lifecycle events published on every agent state change.

use chrono::{DateTime, Utc};
use cruise_domain::prelude::{AgentEvent, AgentState};
use serde::{Deserialize, Serialize};

/// A completed state change of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Agent that changed state.
    pub agent_id: String,
    /// State before the event.
    pub from: AgentState,
    /// State after the event.
    pub to: AgentState,
    /// Event that caused the change.
    pub event: AgentEvent,
    /// When the change was applied.
    pub at: DateTime<Utc>,
}

impl StateTransition {
    /// Whether the agent ended up stopped or exiting.
    pub fn is_shutdown(&self) -> bool {
        matches!(self.to, AgentState::Stopped | AgentState::EmergencyExit)
    }
}
