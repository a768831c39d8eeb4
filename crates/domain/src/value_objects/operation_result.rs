use crate::error::{CruiseError, ErrorKind};
use serde::{Deserialize, Serialize};

/// Typed outcome returned by public orchestration methods instead of
/// propagating errors across component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_kind: Some(kind),
        }
    }
}

impl From<CruiseError> for OperationResult {
    fn from(err: CruiseError) -> Self {
        Self::failed(err.kind(), err.to_string())
    }
}

impl<T> From<Result<T, CruiseError>> for OperationResult
where
    T: Into<OperationResult>,
{
    fn from(result: Result<T, CruiseError>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(err) => err.into(),
        }
    }
}
