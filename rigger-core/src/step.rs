//! Units of work.
//!
//! A [`Step`] pairs a name and its dependencies with a [`StepAction`] that
//! produces a [`ResourceHandle`]. Each action also knows how to undo itself;
//! the default rollback deletes the resource.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Result, StepError};
use crate::handle::{ResourceHandle, ResourceId, ResourceKind};
use crate::provider::{ProviderClient, ProviderError, ResourceSpec};
use crate::template::{self, MalformedReference, Reference};

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// What teardown does with a completed step's handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rollback {
    /// Call [`StepAction::rollback`] (deletes the resource unless overridden).
    #[default]
    Delete,
    /// Leave the resource alone, e.g. because a parent deletion covers it.
    Skip,
}

/// Outputs of a step's declared dependencies.
#[derive(Debug, Clone)]
pub struct StepInputs {
    step: String,
    outputs: HashMap<String, ResourceHandle>,
}

impl StepInputs {
    pub fn new(step: impl Into<String>, outputs: HashMap<String, ResourceHandle>) -> Self {
        Self {
            step: step.into(),
            outputs,
        }
    }

    /// Name of the step these inputs belong to.
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Handle recorded by dependency `name`.
    pub fn dependency(&self, name: &str) -> Result<&ResourceHandle> {
        self.outputs
            .get(name)
            .ok_or_else(|| StepError::UndeclaredDependency {
                step: self.step.clone(),
                dependency: name.to_string(),
            })
    }

    pub fn output(&self, reference: &Reference) -> Result<Value> {
        let handle = self.dependency(&reference.step)?;
        template::handle_field(handle, &reference.path).ok_or_else(|| {
            StepError::UnresolvedReference {
                reference: reference.to_string(),
            }
        })
    }

    /// Substitute every `${step.path}` reference in `value`.
    pub fn resolve(&self, value: &Value) -> Result<Value> {
        template::resolve(value, &|r: &Reference| self.output(r))
    }

    fn resolve_str(&self, value: &str, field: &str) -> Result<String> {
        match self.resolve(&Value::String(value.to_string()))? {
            Value::String(s) => Ok(s),
            other => Err(StepError::InvalidInput(format!(
                "{} of step '{}' resolved to non-string value {}",
                field, self.step, other
            ))),
        }
    }
}

/// Trait for step actions.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Perform the step, returning the handle of the affected resource.
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle>;

    /// Undo the step during teardown.
    async fn rollback(
        &self,
        provider: &dyn ProviderClient,
        handle: &ResourceHandle,
    ) -> std::result::Result<(), ProviderError> {
        provider.delete(handle).await
    }

    /// Names of steps whose outputs this action reads.
    fn referenced_steps(&self) -> std::result::Result<Vec<String>, MalformedReference> {
        Ok(Vec::new())
    }

    /// Rollback policy used when the step does not set one.
    fn default_rollback(&self) -> Rollback {
        Rollback::Delete
    }
}

fn steps_of(values: &[&Value]) -> std::result::Result<Vec<String>, MalformedReference> {
    let mut steps = Vec::new();
    for value in values {
        for r in template::references(value)? {
            if !steps.contains(&r.step) {
                steps.push(r.step);
            }
        }
    }
    Ok(steps)
}

/// Create (or converge) a resource.
#[derive(Debug, Clone)]
pub struct CreateResource {
    kind: ResourceKind,
    name: String,
    parent: Option<String>,
    spec: Value,
}

impl CreateResource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            parent: None,
            spec: Value::Object(Default::default()),
        }
    }

    /// Parent id, usually a reference such as `${group.id}`.
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn spec(mut self, spec: Value) -> Self {
        self.spec = spec;
        self
    }
}

#[async_trait]
impl StepAction for CreateResource {
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle> {
        let name = inputs.resolve_str(&self.name, "name")?;
        let parent = match &self.parent {
            Some(p) => Some(ResourceId::new(inputs.resolve_str(p, "parent")?)),
            None => None,
        };
        let spec = ResourceSpec {
            name,
            parent,
            properties: inputs.resolve(&self.spec)?,
        };

        info!(step = inputs.step(), kind = %self.kind, name = %spec.name, "Creating resource");
        let handle = provider.create_or_update(self.kind, &spec).await?;
        info!(step = inputs.step(), id = %handle.id, "Created resource");
        Ok(handle)
    }

    fn referenced_steps(&self) -> std::result::Result<Vec<String>, MalformedReference> {
        let name = Value::String(self.name.clone());
        let parent = self.parent.clone().map(Value::String).unwrap_or(Value::Null);
        steps_of(&[&name, &parent, &self.spec])
    }
}

/// Patch a resource created by an earlier step.
///
/// Patches are not reverted on teardown; the target's own step deletes it.
#[derive(Debug, Clone)]
pub struct UpdateResource {
    target: String,
    patch: Value,
}

impl UpdateResource {
    pub fn new(target: impl Into<String>, patch: Value) -> Self {
        Self {
            target: target.into(),
            patch,
        }
    }
}

#[async_trait]
impl StepAction for UpdateResource {
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle> {
        let target = inputs.dependency(&self.target)?;
        let patch = inputs.resolve(&self.patch)?;

        info!(step = inputs.step(), id = %target.id, "Updating resource");
        let handle = provider.update(target, &patch).await?;
        info!(step = inputs.step(), id = %handle.id, "Updated resource");
        Ok(handle)
    }

    fn referenced_steps(&self) -> std::result::Result<Vec<String>, MalformedReference> {
        let mut steps = vec![self.target.clone()];
        for step in steps_of(&[&self.patch])? {
            if !steps.contains(&step) {
                steps.push(step);
            }
        }
        Ok(steps)
    }

    fn default_rollback(&self) -> Rollback {
        Rollback::Skip
    }
}

/// A named unit of work with dependencies.
#[derive(Clone)]
pub struct Step {
    name: String,
    depends_on: Vec<String>,
    action: Arc<dyn StepAction>,
    rollback: Rollback,
}

impl Step {
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self::from_arc(name, Arc::new(action))
    }

    pub fn from_arc(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        let rollback = action.default_rollback();
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            action,
            rollback,
        }
    }

    /// Add dependencies; duplicates are ignored and declaration order is kept.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.depends_on.contains(&dependency) {
                self.depends_on.push(dependency);
            }
        }
        self
    }

    pub fn with_rollback(mut self, rollback: Rollback) -> Self {
        self.rollback = rollback;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn rollback(&self) -> Rollback {
        self.rollback
    }

    pub fn action(&self) -> &Arc<dyn StepAction> {
        &self.action
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("depends_on", &self.depends_on)
            .field("rollback", &self.rollback)
            .finish_non_exhaustive()
    }
}
