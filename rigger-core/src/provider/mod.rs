//! Boundary to the cloud platform.
//!
//! The orchestrator only talks to providers through [`ProviderClient`]:
//! - create_or_update: idempotent create, converging an existing resource
//! - update: merge-patch the properties of an existing resource
//! - delete: remove a resource and everything beneath it
//!
//! Every call returns once the provider's long-running operation has finished.

pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::handle::{ResourceHandle, ResourceId, ResourceKind};

pub use sim::{ProviderCall, SimProvider};

/// Failure reported by the provider API.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("provider error {status} {code}: {message}")]
pub struct ProviderError {
    /// HTTP-like status code.
    pub status: u16,
    /// Provider error code (e.g. `QuotaExceeded`).
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "ResourceNotFound", message)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Whether a retry at the transport layer could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.status, 408 | 429) || self.status >= 500
    }
}

/// Desired state for a resource passed to `create_or_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub name: String,
    /// Containing resource; `None` only for top-level resources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ResourceId>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl ResourceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn parent(mut self, parent: ResourceId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// Trait for resource-management backends.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Create a resource, or converge an existing one with the same name and parent.
    async fn create_or_update(
        &self,
        kind: ResourceKind,
        spec: &ResourceSpec,
    ) -> Result<ResourceHandle, ProviderError>;

    /// Apply a JSON merge patch to an existing resource.
    async fn update(
        &self,
        handle: &ResourceHandle,
        patch: &serde_json::Value,
    ) -> Result<ResourceHandle, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, handle: &ResourceHandle) -> Result<(), ProviderError>;
}

/// RFC 7396 JSON merge patch.
pub fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match patch {
        serde_json::Value::Object(entries) => {
            if !target.is_object() {
                *target = serde_json::Value::Object(Default::default());
            }
            if let serde_json::Value::Object(map) = target {
                for (key, value) in entries {
                    if value.is_null() {
                        map.remove(key);
                    } else {
                        merge_patch(map.entry(key.clone()).or_insert(serde_json::Value::Null), value);
                    }
                }
            }
        }
        other => *target = other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_patch_replaces_nested_and_removes_nulls() {
        let mut target = json!({
            "sku": { "name": "Standard_GRS" },
            "networkRuleSet": { "defaultAction": "Deny", "virtualNetworkRules": [{ "id": "s" }] },
            "tags": { "demo": "true" },
        });
        merge_patch(
            &mut target,
            &json!({
                "networkRuleSet": { "defaultAction": "Allow" },
                "tags": null,
                "enableHttpsTrafficOnly": true,
            }),
        );

        assert_eq!(
            target,
            json!({
                "sku": { "name": "Standard_GRS" },
                "networkRuleSet": { "defaultAction": "Allow", "virtualNetworkRules": [{ "id": "s" }] },
                "enableHttpsTrafficOnly": true,
            })
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(ProviderError::not_found("gone").is_not_found());
        assert!(ProviderError::new(429, "TooManyRequests", "slow down").is_transient());
        assert!(ProviderError::new(503, "ServiceUnavailable", "later").is_transient());
        assert!(!ProviderError::new(409, "QuotaExceeded", "quota").is_transient());
    }
}
