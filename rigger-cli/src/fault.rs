//! `--fail-at`: make one step of a plan fail at the provider.
//!
//! The named step keeps its inputs and dependencies. Only its provider writes
//! are rejected, so templates still resolve and the failure lands on that step
//! no matter which resource it touches.

use std::sync::Arc;

use async_trait::async_trait;
use rigger_core::template::MalformedReference;
use rigger_core::{
    Plan, PlanError, ProviderClient, ProviderError, ResourceHandle, ResourceKind, ResourceSpec,
    Rollback, Step, StepAction, StepError, StepInputs,
};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FaultError {
    #[error("No step named '{0}'")]
    UnknownStep(String),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// Provider view handed to a failing step: writes fail, deletes pass through.
struct FailingProvider<'a> {
    inner: &'a dyn ProviderClient,
    error: &'a ProviderError,
}

#[async_trait]
impl ProviderClient for FailingProvider<'_> {
    async fn create_or_update(
        &self,
        kind: ResourceKind,
        spec: &ResourceSpec,
    ) -> Result<ResourceHandle, ProviderError> {
        warn!(%kind, name = %spec.name, "Rejecting create (injected)");
        Err(self.error.clone())
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        _patch: &serde_json::Value,
    ) -> Result<ResourceHandle, ProviderError> {
        warn!(id = %handle.id, "Rejecting update (injected)");
        Err(self.error.clone())
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
        self.inner.delete(handle).await
    }
}

struct FailingAction {
    inner: Arc<dyn StepAction>,
    error: ProviderError,
}

#[async_trait]
impl StepAction for FailingAction {
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle, StepError> {
        let failing = FailingProvider {
            inner: provider,
            error: &self.error,
        };
        self.inner.execute(&failing, inputs).await
    }

    async fn rollback(
        &self,
        provider: &dyn ProviderClient,
        handle: &ResourceHandle,
    ) -> Result<(), ProviderError> {
        self.inner.rollback(provider, handle).await
    }

    fn referenced_steps(&self) -> Result<Vec<String>, MalformedReference> {
        self.inner.referenced_steps()
    }

    fn default_rollback(&self) -> Rollback {
        self.inner.default_rollback()
    }
}

/// Copy of `plan` in which the provider rejects every write made by `step`.
pub fn inject_failure(plan: &Plan, step: &str) -> Result<Plan, FaultError> {
    if plan.step(step).is_none() {
        return Err(FaultError::UnknownStep(step.to_string()));
    }
    let error = ProviderError::new(
        500,
        "InjectedFailure",
        format!("failure injected at step '{}'", step),
    );

    let steps = plan
        .steps()
        .iter()
        .map(|s| {
            if s.name() != step {
                return s.clone();
            }
            let action = FailingAction {
                inner: Arc::clone(s.action()),
                error: error.clone(),
            };
            Step::from_arc(s.name(), Arc::new(action))
                .depends_on(s.dependencies().iter().cloned())
                .with_rollback(s.rollback())
        })
        .collect();

    Ok(Plan::new(steps)?)
}
