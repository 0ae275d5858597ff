//! Run-scoped registry of step outputs.

use std::collections::HashMap;

use crate::error::{Result, StepError};
use crate::handle::ResourceHandle;
use crate::step::{Step, StepInputs};

/// Write-once map from step name to the handle it produced.
///
/// Only the orchestrator loop writes; steps see a [`StepInputs`] snapshot of
/// their dependencies taken after those dependencies completed.
#[derive(Debug, Default)]
pub struct RunContext {
    handles: HashMap<String, ResourceHandle>,
    order: Vec<String>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step's output. Returns false if the step already has one.
    pub fn record(&mut self, step: &str, handle: ResourceHandle) -> bool {
        if self.handles.contains_key(step) {
            return false;
        }
        self.handles.insert(step.to_string(), handle);
        self.order.push(step.to_string());
        true
    }

    pub fn get(&self, step: &str) -> Option<&ResourceHandle> {
        self.handles.get(step)
    }

    /// Build the inputs for `step` from its declared dependencies.
    pub fn inputs_for(&self, step: &Step) -> Result<StepInputs> {
        let mut outputs = HashMap::with_capacity(step.dependencies().len());
        for dependency in step.dependencies() {
            let handle = self
                .handles
                .get(dependency)
                .ok_or_else(|| StepError::MissingOutput {
                    step: step.name().to_string(),
                    dependency: dependency.clone(),
                })?;
            outputs.insert(dependency.clone(), handle.clone());
        }
        Ok(StepInputs::new(step.name(), outputs))
    }

    /// Recorded handles in the order they were recorded.
    pub fn into_handles(mut self) -> Vec<(String, ResourceHandle)> {
        self.order
            .into_iter()
            .filter_map(|name| self.handles.remove(&name).map(|h| (name, h)))
            .collect()
    }
}
