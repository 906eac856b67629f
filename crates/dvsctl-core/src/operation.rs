//! Operation handles, states, and outcomes
//!
//! A handle is the client-side view of a server-side asynchronous job
//! (a vSphere `Task`). The remote client owns handles and refreshes them;
//! the watcher only borrows them while polling.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Queued,
    Running,
    Success,
    Error,
}

impl OperationState {
    /// `success` and `error` are terminal; nothing follows them
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationState::Success | OperationState::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Queued => "queued",
            OperationState::Running => "running",
            OperationState::Success => "success",
            OperationState::Error => "error",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(OperationState::Queued),
            "running" => Ok(OperationState::Running),
            "success" => Ok(OperationState::Success),
            "error" => Ok(OperationState::Error),
            other => Err(CoreError::Validation(format!(
                "unknown operation state '{}' (valid: queued, running, success, error)",
                other
            ))),
        }
    }
}

/// What kind of remote operation a handle tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    CreateSwitch,
    AddPortGroup,
    AddHostMembers,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::CreateSwitch => write!(f, "create-switch"),
            OperationKind::AddPortGroup => write!(f, "add-portgroup"),
            OperationKind::AddHostMembers => write!(f, "add-host-members"),
        }
    }
}

/// Error descriptor attached to a handle in the `error` state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFault {
    /// Human-readable message (the server's localized message when present)
    pub message: String,
    /// Fault class name, e.g. `DuplicateName`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_type: Option<String>,
    /// The fault exactly as the server returned it
    #[serde(default)]
    pub detail: Value,
}

impl RemoteFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fault_type: None,
            detail: Value::Null,
        }
    }

    #[must_use]
    pub fn with_fault_type(mut self, fault_type: impl Into<String>) -> Self {
        self.fault_type = Some(fault_type.into());
        self
    }

    #[must_use]
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fault_type {
            Some(t) => write!(f, "{} ({})", self.message, t),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<RemoteFault> for CoreError {
    fn from(fault: RemoteFault) -> Self {
        let message = fault.to_string();
        CoreError::OperationFailed {
            message,
            detail: fault.detail,
        }
    }
}

/// Reference to a server-side asynchronous job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHandle {
    /// Server identifier of the job (the task's managed object id)
    pub id: String,
    pub kind: OperationKind,
    pub state: OperationState,
    /// Percent complete, when the server reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Present only in `success`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Present only in `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteFault>,
}

impl OperationHandle {
    pub fn new(id: impl Into<String>, kind: OperationKind, state: OperationState) -> Self {
        Self {
            id: id.into(),
            kind,
            state,
            progress: None,
            result: None,
            error: None,
        }
    }

    pub fn queued(id: impl Into<String>, kind: OperationKind) -> Self {
        Self::new(id, kind, OperationState::Queued)
    }

    pub fn running(id: impl Into<String>, kind: OperationKind) -> Self {
        Self::new(id, kind, OperationState::Running)
    }

    pub fn succeeded(id: impl Into<String>, kind: OperationKind, result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::new(id, kind, OperationState::Success)
        }
    }

    pub fn failed(id: impl Into<String>, kind: OperationKind, error: RemoteFault) -> Self {
        Self {
            error: Some(error),
            ..Self::new(id, kind, OperationState::Error)
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress.min(100));
        self
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Final result of watching an operation
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome<T = Value> {
    Success(T),
    Failure(RemoteFault),
}

impl<T> OperationOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, OperationOutcome::Success(_))
    }

    /// Collapse into a `Result`, turning a remote failure into
    /// [`CoreError::OperationFailed`] with the fault detail intact.
    pub fn into_result(self) -> Result<T> {
        match self {
            OperationOutcome::Success(value) => Ok(value),
            OperationOutcome::Failure(fault) => Err(fault.into()),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> OperationOutcome<U> {
        match self {
            OperationOutcome::Success(value) => OperationOutcome::Success(f(value)),
            OperationOutcome::Failure(fault) => OperationOutcome::Failure(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states() {
        assert!(!OperationState::Queued.is_terminal());
        assert!(!OperationState::Running.is_terminal());
        assert!(OperationState::Success.is_terminal());
        assert!(OperationState::Error.is_terminal());
    }

    #[test]
    fn state_parses_case_insensitively() {
        assert_eq!(
            "RUNNING".parse::<OperationState>().unwrap(),
            OperationState::Running
        );
        assert_eq!(
            "success".parse::<OperationState>().unwrap(),
            OperationState::Success
        );
        assert!("paused".parse::<OperationState>().is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        let s = serde_json::to_string(&OperationState::Queued).unwrap();
        assert_eq!(s, "\"queued\"");
        let back: OperationState = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(back, OperationState::Error);
    }

    #[test]
    fn failure_into_result_keeps_detail() {
        let fault = RemoteFault::new("A specified parameter was not correct: spec.name")
            .with_fault_type("InvalidArgument")
            .with_detail(json!({"_typeName": "InvalidArgument", "invalidProperty": "spec.name"}));
        let outcome: OperationOutcome = OperationOutcome::Failure(fault);

        match outcome.into_result() {
            Err(CoreError::OperationFailed { message, detail }) => {
                assert!(message.contains("spec.name"));
                assert!(message.contains("InvalidArgument"));
                assert_eq!(detail["invalidProperty"], "spec.name");
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[test]
    fn success_into_result() {
        let outcome = OperationOutcome::Success(json!("dvs-42"));
        assert!(outcome.is_success());
        assert_eq!(outcome.into_result().unwrap(), json!("dvs-42"));
    }

    #[test]
    fn progress_is_clamped() {
        let handle = OperationHandle::running("task-1", OperationKind::CreateSwitch).with_progress(140);
        assert_eq!(handle.progress, Some(100));
    }
}
