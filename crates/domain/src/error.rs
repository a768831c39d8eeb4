//! Error taxonomy shared by every crate in the workspace.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broad class of a failure, used to decide how callers react to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A limit or policy refused the operation.
    PolicyDenied,
    /// RPC or network failure, usually worth retrying.
    TransientInfra,
    /// Unknown agent or missing wiring.
    Configuration,
    /// The agent was not found.
    NotFound,
    /// State could not be saved or loaded.
    Persistence,
    /// Retries exhausted or otherwise final.
    Unrecoverable,
    /// Another operation of the same kind is already running.
    Busy,
}

/// Errors produced by the orchestration engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CruiseError {
    /// No agent with this id is registered.
    #[error("agent {0} is not registered")]
    AgentNotRegistered(String),

    /// The agent has no wallet binding.
    #[error("agent {0} has no wallet configured")]
    MissingWallet(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Chain-facing call failed.
    #[error("chain request failed: {0}")]
    Chain(String),

    /// Persistence store failed.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Recommendation or optimizer collaborator failed.
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    /// Transaction limit refused the operation.
    #[error("transaction limit denied {0}")]
    LimitDenied(String),

    /// Risk assessment for this agent is already in flight.
    #[error("risk assessment already in progress for agent {0}")]
    AssessmentInProgress(String),

    /// Transaction request not found in the executor table.
    #[error("transaction request {0} not found")]
    RequestNotFound(Uuid),

    /// A transaction ran out of retries.
    #[error("transaction {request_id} failed after {retries} retries: {reason}")]
    RetriesExhausted {
        request_id: Uuid,
        retries: u32,
        reason: String,
    },
}

impl CruiseError {
    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AgentNotRegistered(_) => ErrorKind::NotFound,
            Self::MissingWallet(_) | Self::InvalidConfig(_) => ErrorKind::Configuration,
            Self::Chain(_) | Self::Collaborator(_) => ErrorKind::TransientInfra,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::LimitDenied(_) => ErrorKind::PolicyDenied,
            Self::AssessmentInProgress(_) => ErrorKind::Busy,
            Self::RequestNotFound(_) => ErrorKind::NotFound,
            Self::RetriesExhausted { .. } => ErrorKind::Unrecoverable,
        }
    }

    /// Wraps a chain-port failure, keeping the full cause chain.
    pub fn chain(err: impl std::fmt::Display) -> Self {
        Self::Chain(format!("{err:#}"))
    }

    /// Wraps a persistence-port failure.
    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    /// Wraps a recommendation/optimizer failure.
    pub fn collaborator(err: impl std::fmt::Display) -> Self {
        Self::Collaborator(format!("{err:#}"))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, CruiseError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::OperationResult;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CruiseError::AgentNotRegistered("a".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(CruiseError::chain("timeout").kind(), ErrorKind::TransientInfra);
        assert_eq!(
            CruiseError::AssessmentInProgress("a".into()).kind(),
            ErrorKind::Busy
        );
    }

    #[test]
    fn test_error_into_operation_result() {
        let result: OperationResult = CruiseError::MissingWallet("agent-1".into()).into();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Configuration));
        assert_eq!(result.message, "agent agent-1 has no wallet configured");
    }
}
