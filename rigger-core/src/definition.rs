//! Declarative step definitions.
//!
//! Plans can be written as JSON instead of code:
//!
//! ```json
//! { "steps": [
//!     { "name": "group",
//!       "action": { "create": { "kind": "resource_group", "name": "rg-demo",
//!                               "spec": { "location": "eastus" } } } },
//!     { "name": "vnet", "depends_on": ["group"],
//!       "action": { "create": { "kind": "network", "name": "vnet-demo",
//!                               "parent": "${group.id}",
//!                               "spec": { "addressSpace": { "addressPrefixes": ["10.0.0.0/28"] } } } } }
//! ] }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PlanError;
use crate::handle::ResourceKind;
use crate::plan::Plan;
use crate::step::{CreateResource, Rollback, Step, UpdateResource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDefinition {
    Create {
        kind: ResourceKind,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<String>,
        #[serde(default = "empty_object")]
        spec: Value,
    },
    Update {
        target: String,
        #[serde(default = "empty_object")]
        patch: Value,
    },
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    pub action: ActionDefinition,
    /// Overrides the action's default rollback policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Rollback>,
}

impl StepDefinition {
    pub fn into_step(self) -> Step {
        let step = match self.action {
            ActionDefinition::Create {
                kind,
                name,
                parent,
                spec,
            } => {
                let mut action = CreateResource::new(kind, name).spec(spec);
                if let Some(parent) = parent {
                    action = action.parent(parent);
                }
                Step::new(self.name, action)
            }
            ActionDefinition::Update { target, patch } => {
                Step::new(self.name, UpdateResource::new(target, patch))
            }
        }
        .depends_on(self.depends_on);

        match self.rollback {
            Some(rollback) => step.with_rollback(rollback),
            None => step,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanDefinition {
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

impl PlanDefinition {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Build and validate the plan.
    pub fn into_plan(self) -> Result<Plan, PlanError> {
        Plan::new(self.steps.into_iter().map(StepDefinition::into_step).collect())
    }
}
