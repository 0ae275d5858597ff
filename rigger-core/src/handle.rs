//! Records of created resources.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of cloud resource a step manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    Network,
    Subnet,
    StorageAccount,
    PublicIp,
    NetworkInterface,
    VirtualMachine,
}

impl ResourceKind {
    /// Provider namespace and type segment used in resource ids.
    pub fn provider_type(&self) -> &'static str {
        match self {
            ResourceKind::ResourceGroup => "resourceGroups",
            ResourceKind::Network => "Microsoft.Network/virtualNetworks",
            ResourceKind::Subnet => "subnets",
            ResourceKind::StorageAccount => "Microsoft.Storage/storageAccounts",
            ResourceKind::PublicIp => "Microsoft.Network/publicIPAddresses",
            ResourceKind::NetworkInterface => "Microsoft.Network/networkInterfaces",
            ResourceKind::VirtualMachine => "Microsoft.Compute/virtualMachines",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::ResourceGroup => "resource_group",
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::StorageAccount => "storage_account",
            ResourceKind::PublicIp => "public_ip",
            ResourceKind::NetworkInterface => "network_interface",
            ResourceKind::VirtualMachine => "virtual_machine",
        };
        f.write_str(s)
    }
}

/// Opaque provider identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `self` lies beneath `ancestor` in the id hierarchy.
    pub fn is_descendant_of(&self, ancestor: &ResourceId) -> bool {
        self.0.len() > ancestor.0.len()
            && self.0.starts_with(&ancestor.0)
            && self.0.as_bytes()[ancestor.0.len()] == b'/'
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A resource created by a completed step.
///
/// Handles are never mutated after being recorded; an update produces a new
/// handle for the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub id: ResourceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Provider-reported state, readable by later steps.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl ResourceHandle {
    pub fn new(kind: ResourceKind, id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            name: name.into(),
            created_at: Utc::now(),
            properties: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// Look up a dotted path (`a.b.0.c`) inside `properties`.
    pub fn property(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.').try_fold(&self.properties, |value, segment| {
            match value {
                serde_json::Value::Object(map) => map.get(segment),
                serde_json::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            }
        })
    }
}
