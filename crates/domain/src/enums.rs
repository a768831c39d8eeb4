use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an LP agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Initializing,
    Running,
    Waiting,
    PartialReducing,
    EmergencyExit,
    Stopped,
}

/// Events that drive the agent lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentEvent {
    Start,
    Stop,
    FundsLow,
    FundsSufficient,
    RiskMedium,
    RiskHigh,
    RiskResolved,
    UserEmergency,
}

impl AgentState {
    /// Returns the state reached by applying `event`, or `None` when the
    /// pair is unhandled. Self-loops are reported as unhandled.
    #[must_use]
    pub fn on_event(self, event: AgentEvent) -> Option<AgentState> {
        use AgentEvent as E;
        use AgentState as S;

        let next = match (self, event) {
            (S::Initializing | S::Stopped, E::Start) => S::Running,
            (_, E::Stop) => S::Stopped,
            (S::Running, E::FundsLow) => S::Waiting,
            (S::Waiting, E::FundsSufficient) => S::Running,
            (S::Running, E::RiskMedium) => S::PartialReducing,
            (_, E::RiskHigh | E::UserEmergency) => S::EmergencyExit,
            (S::PartialReducing, E::RiskResolved) => S::Running,
            _ => return None,
        };

        (next != self).then_some(next)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::PartialReducing => "PARTIAL_REDUCING",
            Self::EmergencyExit => "EMERGENCY_EXIT",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    #[default]
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    AddLiquidity,
    RemoveLiquidity,
    Swap,
    EmergencyExit,
}

impl TransactionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddLiquidity => "add-liquidity",
            Self::RemoveLiquidity => "remove-liquidity",
            Self::Swap => "swap",
            Self::EmergencyExit => "emergency-exit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a transaction request. Ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransactionPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Status of a transaction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Signing,
    Sending,
    Confirming,
    Confirmed,
    Failed,
    Retrying,
    Cancelled,
}

impl TransactionStatus {
    /// Whether the request lifecycle allows moving from `self` to `next`.
    ///
    /// `Failed` is only left through `Retrying`; whether a retry is still
    /// allowed is decided by the retry budget, not by this table.
    #[must_use]
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus as S;
        matches!(
            (self, next),
            (S::Pending, S::Signing)
                | (S::Signing, S::Sending)
                | (S::Sending, S::Confirming)
                | (S::Confirming, S::Confirmed)
                | (S::Signing | S::Sending | S::Confirming, S::Failed)
                | (S::Failed, S::Retrying)
                | (S::Retrying, S::Signing)
                | (S::Pending | S::Retrying, S::Cancelled)
        )
    }

    #[must_use]
    pub fn is_cancellable(self) -> bool {
        matches!(self, Self::Pending | Self::Retrying)
    }

    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Signing | Self::Sending | Self::Confirming)
    }
}

/// Kind of funds movement recorded in an agent's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundsFlow {
    Deposit,
    Withdrawal,
    AddLiquidity,
    RemoveLiquidity,
    Swap,
    Fee,
}

impl FundsFlow {
    /// Flows that spend the wallet's available balance.
    #[must_use]
    pub fn is_outflow(self) -> bool {
        matches!(self, Self::Withdrawal | Self::AddLiquidity | Self::Swap)
    }

    /// Flows that count toward the daily transacted volume cap.
    #[must_use]
    pub fn counts_toward_volume(self) -> bool {
        !matches!(self, Self::Fee | Self::Deposit)
    }
}

impl From<TransactionType> for FundsFlow {
    fn from(tx_type: TransactionType) -> Self {
        match tx_type {
            TransactionType::AddLiquidity => Self::AddLiquidity,
            TransactionType::RemoveLiquidity | TransactionType::EmergencyExit => {
                Self::RemoveLiquidity
            }
            TransactionType::Swap => Self::Swap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_only_from_initializing_or_stopped() {
        assert_eq!(
            AgentState::Initializing.on_event(AgentEvent::Start),
            Some(AgentState::Running)
        );
        assert_eq!(
            AgentState::Stopped.on_event(AgentEvent::Start),
            Some(AgentState::Running)
        );
        assert_eq!(AgentState::Waiting.on_event(AgentEvent::Start), None);
    }

    #[test]
    fn test_emergency_reachable_from_any_state() {
        for state in [
            AgentState::Initializing,
            AgentState::Running,
            AgentState::Waiting,
            AgentState::PartialReducing,
            AgentState::Stopped,
        ] {
            assert_eq!(
                state.on_event(AgentEvent::RiskHigh),
                Some(AgentState::EmergencyExit)
            );
            assert_eq!(
                state.on_event(AgentEvent::UserEmergency),
                Some(AgentState::EmergencyExit)
            );
        }
        assert_eq!(AgentState::EmergencyExit.on_event(AgentEvent::RiskHigh), None);
    }

    #[test]
    fn test_unhandled_pairs_are_noops() {
        assert_eq!(AgentState::Waiting.on_event(AgentEvent::RiskMedium), None);
        assert_eq!(AgentState::Running.on_event(AgentEvent::RiskResolved), None);
        assert_eq!(AgentState::Stopped.on_event(AgentEvent::Stop), None);
    }

    #[test]
    fn test_terminal_transaction_statuses_are_frozen() {
        let all = [
            TransactionStatus::Pending,
            TransactionStatus::Signing,
            TransactionStatus::Sending,
            TransactionStatus::Confirming,
            TransactionStatus::Confirmed,
            TransactionStatus::Failed,
            TransactionStatus::Retrying,
            TransactionStatus::Cancelled,
        ];
        for next in all {
            assert!(!TransactionStatus::Confirmed.can_transition_to(next));
            assert!(!TransactionStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn test_cancel_only_from_pending_or_retrying() {
        assert!(TransactionStatus::Pending.can_transition_to(TransactionStatus::Cancelled));
        assert!(TransactionStatus::Retrying.can_transition_to(TransactionStatus::Cancelled));
        assert!(!TransactionStatus::Sending.can_transition_to(TransactionStatus::Cancelled));
        assert!(!TransactionStatus::Failed.can_transition_to(TransactionStatus::Cancelled));
    }

    #[test]
    fn test_agent_state_serializes_screaming_case() {
        let json = serde_json::to_string(&AgentState::PartialReducing).unwrap();
        assert_eq!(json, "\"PARTIAL_REDUCING\"");
    }
}
