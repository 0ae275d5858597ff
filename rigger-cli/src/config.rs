//! Run configuration: JSON file, then command-line overrides, then validation.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Location is required")]
    LocationRequired,

    #[error("max_parallel must be at least 1")]
    InvalidMaxParallel,

    #[error("{0} has host bits set (did you mean {1}?)")]
    HostBitsSet(Ipv4Net, Ipv4Net),

    #[error("Subnet {0} is not within address space {1}")]
    SubnetOutsideSpace(Ipv4Net, Ipv4Net),

    #[error("Address space {0} overlaps with {1}")]
    AddressSpaceOverlap(Ipv4Net, Ipv4Net),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum VmSize {
    #[serde(rename = "Standard_B2s")]
    #[value(name = "Standard_B2s")]
    StandardB2s,
    #[serde(rename = "Standard_D2_v2")]
    #[value(name = "Standard_D2_v2")]
    StandardD2V2,
    #[default]
    #[serde(rename = "Standard_D4_v2")]
    #[value(name = "Standard_D4_v2")]
    StandardD4V2,
    #[serde(rename = "Standard_DS1_v2")]
    #[value(name = "Standard_DS1_v2")]
    StandardDs1V2,
}

impl VmSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmSize::StandardB2s => "Standard_B2s",
            VmSize::StandardD2V2 => "Standard_D2_v2",
            VmSize::StandardD4V2 => "Standard_D4_v2",
            VmSize::StandardDs1V2 => "Standard_DS1_v2",
        }
    }
}

/// Storage account SKU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum StorageRedundancy {
    #[serde(rename = "Standard_LRS")]
    #[value(name = "Standard_LRS")]
    StandardLrs,
    #[default]
    #[serde(rename = "Standard_GRS")]
    #[value(name = "Standard_GRS")]
    StandardGrs,
    #[serde(rename = "Standard_RAGRS")]
    #[value(name = "Standard_RAGRS")]
    StandardRagrs,
    #[serde(rename = "Standard_ZRS")]
    #[value(name = "Standard_ZRS")]
    StandardZrs,
}

impl StorageRedundancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageRedundancy::StandardLrs => "Standard_LRS",
            StorageRedundancy::StandardGrs => "Standard_GRS",
            StorageRedundancy::StandardRagrs => "Standard_RAGRS",
            StorageRedundancy::StandardZrs => "Standard_ZRS",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub location: String,
    /// Address space of the network holding the storage subnet.
    pub address_space: Ipv4Net,
    pub subnet_prefix: Ipv4Net,
    /// Address space of the VM network. Its single subnet spans all of it.
    pub vm_address_space: Ipv4Net,
    pub vm_size: VmSize,
    pub storage_redundancy: StorageRedundancy,
    /// Prepended to every generated resource name.
    pub name_prefix: String,
    pub max_parallel: usize,
    /// Exit with status 2 when teardown leaves resources behind.
    pub fail_on_orphans: bool,
    /// Artificial delay of every simulated provider call.
    pub sim_latency_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            location: "eastus".to_string(),
            address_space: Ipv4Net::new([10, 0, 0, 0].into(), 28).unwrap_or_default(),
            subnet_prefix: Ipv4Net::new([10, 0, 0, 8].into(), 29).unwrap_or_default(),
            vm_address_space: Ipv4Net::new([10, 1, 0, 0].into(), 28).unwrap_or_default(),
            vm_size: VmSize::default(),
            storage_redundancy: StorageRedundancy::default(),
            name_prefix: String::new(),
            max_parallel: 1,
            fail_on_orphans: false,
            sim_latency_ms: 0,
        }
    }
}

/// Command-line overrides, applied on top of the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Azure region
    #[arg(long)]
    pub location: Option<String>,

    /// Address space of the storage network (CIDR)
    #[arg(long)]
    pub address_space: Option<Ipv4Net>,

    /// Storage subnet prefix (CIDR, inside --address-space)
    #[arg(long)]
    pub subnet_prefix: Option<Ipv4Net>,

    /// Address space of the VM network (CIDR)
    #[arg(long)]
    pub vm_address_space: Option<Ipv4Net>,

    /// VM size
    #[arg(long, value_enum)]
    pub vm_size: Option<VmSize>,

    /// Storage account redundancy
    #[arg(long, value_enum)]
    pub storage_redundancy: Option<StorageRedundancy>,

    /// Prefix for generated resource names
    #[arg(long)]
    pub name_prefix: Option<String>,

    /// Maximum number of steps running at once
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Exit with status 2 if resources are left behind after teardown
    #[arg(long)]
    pub fail_on_orphans: bool,

    /// Simulated provider latency in milliseconds
    #[arg(long)]
    pub sim_latency_ms: Option<u64>,
}

impl RunConfig {
    /// Load from `path`, or defaults when no file is given.
    pub async fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(location) = &overrides.location {
            self.location = location.clone();
        }
        if let Some(net) = overrides.address_space {
            self.address_space = net;
        }
        if let Some(net) = overrides.subnet_prefix {
            self.subnet_prefix = net;
        }
        if let Some(net) = overrides.vm_address_space {
            self.vm_address_space = net;
        }
        if let Some(size) = overrides.vm_size {
            self.vm_size = size;
        }
        if let Some(redundancy) = overrides.storage_redundancy {
            self.storage_redundancy = redundancy;
        }
        if let Some(prefix) = &overrides.name_prefix {
            self.name_prefix = prefix.clone();
        }
        if let Some(n) = overrides.max_parallel {
            self.max_parallel = n;
        }
        if overrides.fail_on_orphans {
            self.fail_on_orphans = true;
        }
        if let Some(ms) = overrides.sim_latency_ms {
            self.sim_latency_ms = ms;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.location.trim().is_empty() {
            return Err(ConfigError::LocationRequired);
        }
        if self.max_parallel == 0 {
            return Err(ConfigError::InvalidMaxParallel);
        }

        for net in [self.address_space, self.subnet_prefix, self.vm_address_space] {
            if net.trunc() != net {
                return Err(ConfigError::HostBitsSet(net, net.trunc()));
            }
        }

        if !self.address_space.contains(&self.subnet_prefix) {
            return Err(ConfigError::SubnetOutsideSpace(
                self.subnet_prefix,
                self.address_space,
            ));
        }

        if subnets_overlap(&self.address_space, &self.vm_address_space) {
            return Err(ConfigError::AddressSpaceOverlap(
                self.address_space,
                self.vm_address_space,
            ));
        }

        Ok(())
    }
}

/// Check if two IPv4 subnets overlap.
pub fn subnets_overlap(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network())
        || a.contains(&b.broadcast())
        || b.contains(&a.network())
        || b.contains(&a.broadcast())
}
