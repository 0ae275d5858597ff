//! Error types.

use thiserror::Error;

use crate::provider::ProviderError;

/// Plan construction errors (dependency errors).
///
/// All of these are programming errors in the step configuration and are
/// raised before any step executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("invalid step name '{0}'")]
    InvalidStepName(String),

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("step '{0}' depends on itself")]
    SelfDependency(String),

    #[error("step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("step '{step}' uses output of '{reference}' without depending on it")]
    UndeclaredReference { step: String, reference: String },

    #[error("step '{step}' has malformed reference '{reference}'")]
    MalformedReference { step: String, reference: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Errors raised while executing a single step.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The step asked for an output it did not declare a dependency on.
    #[error("step '{step}' did not declare a dependency on '{dependency}'")]
    UndeclaredDependency { step: String, dependency: String },

    /// A declared dependency has no recorded output.
    #[error("step '{step}' is missing the output of '{dependency}'")]
    MissingOutput { step: String, dependency: String },

    #[error("reference '{reference}' could not be resolved")]
    UnresolvedReference { reference: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl StepError {
    /// Whether this is a dependency error: an output that was not declared,
    /// not recorded, or does not exist.
    pub fn is_dependency(&self) -> bool {
        matches!(
            self,
            StepError::UndeclaredDependency { .. }
                | StepError::MissingOutput { .. }
                | StepError::UnresolvedReference { .. }
        )
    }
}

/// Result type for step execution.
pub type Result<T> = std::result::Result<T, StepError>;
