//! Outcome of a run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::StepError;
use crate::handle::{ResourceHandle, ResourceId, ResourceKind};
use crate::provider::ProviderError;
use crate::step::StepState;

/// Orchestrator-level state.
///
/// `Running → {Succeeded, Failed} → TearingDown → Finished`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Running,
    Succeeded,
    Failed,
    TearingDown,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Provider,
    Dependency,
    /// An input resolved to a value of the wrong type.
    InvalidInput,
    Cancelled,
    Internal,
}

/// The error that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    /// Step that failed, if the failure belongs to one.
    pub step: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The provider reported a condition that may clear on a later run.
    pub transient: bool,
}

impl ErrorInfo {
    pub fn from_step_error(step: &str, error: &StepError) -> Self {
        match error {
            StepError::Provider(e) => Self {
                kind: ErrorKind::Provider,
                step: Some(step.to_string()),
                message: e.message.clone(),
                status: Some(e.status),
                code: Some(e.code.clone()),
                transient: e.is_transient(),
            },
            other => Self {
                kind: if other.is_dependency() {
                    ErrorKind::Dependency
                } else {
                    ErrorKind::InvalidInput
                },
                step: Some(step.to_string()),
                message: other.to_string(),
                status: None,
                code: None,
                transient: false,
            },
        }
    }

    pub fn cancelled(reason: &str, next_step: Option<&str>) -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            step: next_step.map(str::to_string),
            message: format!("run cancelled: {}", reason),
            status: None,
            code: None,
            transient: false,
        }
    }

    pub fn internal(step: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            step: step.map(str::to_string),
            message: message.into(),
            status: None,
            code: None,
            transient: false,
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(step) = &self.step {
            write!(f, "step '{}': ", step)?;
        }
        match (&self.status, &self.code) {
            (Some(status), Some(code)) => write!(f, "{} {}: {}", status, code, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// A resource that could not be removed during teardown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownError {
    pub step: String,
    pub kind: ResourceKind,
    pub resource_id: ResourceId,
    pub error: ProviderError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub name: String,
    pub state: StepState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedHandle {
    pub step: String,
    pub handle: ResourceHandle,
}

/// Result of [`Orchestrator::run`](crate::Orchestrator::run).
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub succeeded: bool,
    pub error: Option<ErrorInfo>,
    /// Completed steps in completion order.
    pub steps_completed: Vec<String>,
    /// Final state of every step, in declaration order.
    pub steps: Vec<StepOutcome>,
    /// Handles recorded during the run, in completion order.
    pub handles: Vec<RecordedHandle>,
    /// Steps whose resources were removed, in teardown order.
    pub torn_down: Vec<String>,
    pub teardown_errors: Vec<TeardownError>,
    pub phase: RunPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Whether some resources are left behind and need manual cleanup.
    pub fn has_orphans(&self) -> bool {
        !self.teardown_errors.is_empty()
    }

    /// Ids of resources left behind.
    pub fn orphaned(&self) -> impl Iterator<Item = &ResourceId> {
        self.teardown_errors.iter().map(|e| &e.resource_id)
    }

    pub fn state_of(&self, step: &str) -> Option<StepState> {
        self.steps.iter().find(|s| s.name == step).map(|s| s.state)
    }
}
