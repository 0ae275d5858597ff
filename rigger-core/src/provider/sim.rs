//! Simulated ARM provider.
//!
//! Keeps resources in memory under ARM-shaped ids, so that deleting a resource
//! group removes everything it contains. Faults can be injected per operation
//! and resource name; every call is journaled.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ProviderClient, ProviderError, ResourceSpec, merge_patch};
use crate::handle::{ResourceHandle, ResourceId, ResourceKind};

/// A call received by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Create { kind: ResourceKind, name: String },
    Update { id: ResourceId },
    Delete { id: ResourceId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    Update,
    Delete,
}

struct Fault {
    operation: Operation,
    name: String,
    error: ProviderError,
}

#[derive(Default)]
struct SimState {
    resources: BTreeMap<ResourceId, ResourceHandle>,
    faults: Vec<Fault>,
    journal: Vec<ProviderCall>,
    allocated_ips: u32,
}

impl SimState {
    fn fault(&self, operation: Operation, name: &str) -> Option<ProviderError> {
        self.faults
            .iter()
            .find(|f| f.operation == operation && f.name == name)
            .map(|f| f.error.clone())
    }
}

/// In-memory provider mimicking Azure Resource Manager semantics.
pub struct SimProvider {
    subscription_id: String,
    latency: Duration,
    state: Mutex<SimState>,
}

impl SimProvider {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            latency: Duration::ZERO,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Delay every call, simulating a long-running operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every create of a resource called `name`.
    pub async fn fail_create(&self, name: &str, error: ProviderError) {
        self.inject(Operation::Create, name, error).await;
    }

    /// Fail every update of a resource called `name`.
    pub async fn fail_update(&self, name: &str, error: ProviderError) {
        self.inject(Operation::Update, name, error).await;
    }

    /// Fail every delete of a resource called `name`.
    pub async fn fail_delete(&self, name: &str, error: ProviderError) {
        self.inject(Operation::Delete, name, error).await;
    }

    async fn inject(&self, operation: Operation, name: &str, error: ProviderError) {
        self.state.lock().await.faults.push(Fault {
            operation,
            name: name.to_string(),
            error,
        });
    }

    /// All calls received so far, in order.
    pub async fn journal(&self) -> Vec<ProviderCall> {
        self.state.lock().await.journal.clone()
    }

    /// Resources currently present.
    pub async fn resources(&self) -> Vec<ResourceHandle> {
        self.state.lock().await.resources.values().cloned().collect()
    }

    async fn wait(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn resource_id(
        &self,
        kind: ResourceKind,
        spec: &ResourceSpec,
        state: &SimState,
    ) -> Result<ResourceId, ProviderError> {
        let Some(parent_id) = &spec.parent else {
            return match expected_parent(kind) {
                None => Ok(ResourceId::new(format!(
                    "/subscriptions/{}/resourceGroups/{}",
                    self.subscription_id, spec.name
                ))),
                Some(parent_kind) => Err(ProviderError::new(
                    400,
                    "InvalidParent",
                    format!("{} '{}' requires a parent {}", kind, spec.name, parent_kind),
                )),
            };
        };

        let parent = state.resources.get(parent_id).ok_or_else(|| {
            ProviderError::new(
                404,
                "ParentResourceNotFound",
                format!("parent {} of '{}' does not exist", parent_id, spec.name),
            )
        })?;

        if expected_parent(kind) != Some(parent.kind) {
            return Err(ProviderError::new(
                400,
                "InvalidParent",
                format!("{} '{}' cannot be created under {}", kind, spec.name, parent.kind),
            ));
        }

        Ok(ResourceId::new(format!(
            "{}/{}/{}",
            if kind == ResourceKind::Subnet {
                parent_id.as_str().to_string()
            } else {
                format!("{}/providers", parent_id)
            },
            kind.provider_type(),
            spec.name
        )))
    }
}

/// Kind of the resource that must contain `kind`.
fn expected_parent(kind: ResourceKind) -> Option<ResourceKind> {
    match kind {
        ResourceKind::ResourceGroup => None,
        ResourceKind::Subnet => Some(ResourceKind::Network),
        _ => Some(ResourceKind::ResourceGroup),
    }
}

fn validate_name(kind: ResourceKind, name: &str) -> Result<(), ProviderError> {
    if name.trim().is_empty() {
        return Err(ProviderError::new(
            400,
            "InvalidResourceName",
            format!("{} name must not be empty", kind),
        ));
    }
    if kind == ResourceKind::StorageAccount {
        let valid = (3..=24).contains(&name.len())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid {
            return Err(ProviderError::new(
                400,
                "AccountNameInvalid",
                format!(
                    "'{}' must be 3-24 characters of lowercase letters and digits",
                    name
                ),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl ProviderClient for SimProvider {
    async fn create_or_update(
        &self,
        kind: ResourceKind,
        spec: &ResourceSpec,
    ) -> Result<ResourceHandle, ProviderError> {
        debug!(%kind, name = %spec.name, "create_or_update");
        self.wait().await;

        let mut state = self.state.lock().await;
        state.journal.push(ProviderCall::Create {
            kind,
            name: spec.name.clone(),
        });
        if let Some(error) = state.fault(Operation::Create, &spec.name) {
            return Err(error);
        }

        validate_name(kind, &spec.name)?;
        let id = self.resource_id(kind, spec, &state)?;

        let mut properties = spec.properties.clone();
        if !properties.is_object() {
            properties = json!({});
        }
        properties["provisioningState"] = json!("Succeeded");

        let existing = state.resources.get(&id).cloned();
        let handle = match existing {
            Some(existing) if existing.kind != kind => {
                return Err(ProviderError::new(
                    409,
                    "Conflict",
                    format!("{} already exists as {}", id, existing.kind),
                ));
            }
            Some(existing) => {
                // Converge: keep identity and allocated state, replace the rest.
                if let Some(ip) = existing.properties.get("ipAddress") {
                    properties["ipAddress"] = ip.clone();
                }
                ResourceHandle {
                    properties,
                    ..existing
                }
            }
            None => {
                if kind == ResourceKind::PublicIp {
                    state.allocated_ips += 1;
                    let n = state.allocated_ips;
                    properties["ipAddress"] =
                        json!(format!("20.{}.{}.{}", (n >> 16) & 0xff, (n >> 8) & 0xff, n & 0xff));
                }
                ResourceHandle::new(kind, id.clone(), spec.name.clone()).with_properties(properties)
            }
        };

        state.resources.insert(id, handle.clone());
        Ok(handle)
    }

    async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &serde_json::Value,
    ) -> Result<ResourceHandle, ProviderError> {
        debug!(id = %handle.id, "update");
        if !patch.is_object() {
            return Err(ProviderError::new(
                400,
                "InvalidPatch",
                "patch must be a JSON object",
            ));
        }
        self.wait().await;

        let mut state = self.state.lock().await;
        state.journal.push(ProviderCall::Update {
            id: handle.id.clone(),
        });
        if let Some(error) = state.fault(Operation::Update, &handle.name) {
            return Err(error);
        }

        let current = state
            .resources
            .get_mut(&handle.id)
            .ok_or_else(|| ProviderError::not_found(format!("{} does not exist", handle.id)))?;
        merge_patch(&mut current.properties, patch);
        current.properties["provisioningState"] = json!("Succeeded");
        Ok(current.clone())
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), ProviderError> {
        debug!(id = %handle.id, "delete");
        self.wait().await;

        let mut state = self.state.lock().await;
        state.journal.push(ProviderCall::Delete {
            id: handle.id.clone(),
        });
        if let Some(error) = state.fault(Operation::Delete, &handle.name) {
            return Err(error);
        }

        if state.resources.remove(&handle.id).is_none() {
            return Err(ProviderError::not_found(format!(
                "{} does not exist",
                handle.id
            )));
        }
        state
            .resources
            .retain(|id, _| !id.is_descendant_of(&handle.id));
        Ok(())
    }
}
