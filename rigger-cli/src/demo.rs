//! Built-in demo plan: a storage account reachable only from one subnet, later
//! opened to the public IP of a VM on a second network.

use rigger_core::{ActionDefinition, PlanDefinition, ResourceKind, StepDefinition};
use serde_json::{Value, json};

use crate::config::RunConfig;
use crate::naming::{self, Namer};

const ADMIN_PASSWORD_LEN: usize = 20;

fn create(
    step: &str,
    depends_on: &[&str],
    kind: ResourceKind,
    name: String,
    parent: Option<&str>,
    spec: Value,
) -> StepDefinition {
    StepDefinition {
        name: step.to_string(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        action: ActionDefinition::Create {
            kind,
            name,
            parent: parent.map(str::to_string),
            spec,
        },
        rollback: None,
    }
}

fn update(step: &str, depends_on: &[&str], target: &str, patch: Value) -> StepDefinition {
    StepDefinition {
        name: step.to_string(),
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        action: ActionDefinition::Update {
            target: target.to_string(),
            patch,
        },
        rollback: None,
    }
}

/// Build the demo plan for `config`, naming resources with `namer`.
pub fn plan(config: &RunConfig, namer: &Namer) -> PlanDefinition {
    let location = config.location.as_str();

    let steps = vec![
        create(
            "group",
            &[],
            ResourceKind::ResourceGroup,
            namer.name("VirtualNetworkRG"),
            None,
            json!({ "location": location }),
        ),
        create(
            "vnet",
            &["group"],
            ResourceKind::Network,
            namer.name("VirtualNetwork_"),
            Some("${group.id}"),
            json!({
                "location": location,
                "addressSpace": { "addressPrefixes": [config.address_space.to_string()] },
            }),
        ),
        create(
            "subnet",
            &["vnet"],
            ResourceKind::Subnet,
            namer.name("subnet_"),
            Some("${vnet.id}"),
            json!({
                "addressPrefix": config.subnet_prefix.to_string(),
                "serviceEndpoints": [{ "service": "Microsoft.Storage" }],
            }),
        ),
        create(
            "storage",
            &["group", "subnet"],
            ResourceKind::StorageAccount,
            namer.storage_account("saname"),
            Some("${group.id}"),
            json!({
                "location": location,
                "sku": { "name": config.storage_redundancy.as_str() },
                "kind": "StorageV2",
                "networkRuleSet": {
                    "defaultAction": "Deny",
                    "virtualNetworkRules": [{ "id": "${subnet.id}", "action": "Allow" }],
                },
            }),
        ),
        create(
            "pip",
            &["group"],
            ResourceKind::PublicIp,
            namer.name("pip"),
            Some("${group.id}"),
            json!({
                "location": location,
                "sku": { "name": "Standard" },
                "publicIPAddressVersion": "IPv4",
                "publicIPAllocationMethod": "Static",
                "dnsSettings": { "domainNameLabel": namer.dns_label("pip") },
            }),
        ),
        create(
            "vnet2",
            &["group"],
            ResourceKind::Network,
            namer.name("VirtualNetwork2_"),
            Some("${group.id}"),
            json!({
                "location": location,
                "addressSpace": { "addressPrefixes": [config.vm_address_space.to_string()] },
            }),
        ),
        create(
            "subnet2",
            &["vnet2"],
            ResourceKind::Subnet,
            namer.name("subnet2_"),
            Some("${vnet2.id}"),
            json!({
                "addressPrefix": config.vm_address_space.to_string(),
                "serviceEndpoints": [{ "service": "Microsoft.Storage" }],
            }),
        ),
        create(
            "nic",
            &["group", "subnet2", "pip"],
            ResourceKind::NetworkInterface,
            namer.name("networkInterface"),
            Some("${group.id}"),
            json!({
                "location": location,
                "ipConfigurations": [{
                    "name": "internal",
                    "properties": {
                        "primary": true,
                        "subnet": { "id": "${subnet2.id}" },
                        "privateIPAllocationMethod": "Dynamic",
                        "publicIPAddress": { "id": "${pip.id}" },
                    },
                }],
            }),
        ),
        create(
            "vm",
            &["group", "nic"],
            ResourceKind::VirtualMachine,
            namer.name("vm"),
            Some("${group.id}"),
            json!({
                "location": location,
                "hardwareProfile": { "vmSize": config.vm_size.as_str() },
                "osProfile": {
                    "adminUsername": namer.name("admin"),
                    "adminPassword": naming::password(ADMIN_PASSWORD_LEN),
                    "computerName": namer.name("computer"),
                },
                "networkProfile": {
                    "networkInterfaces": [{ "id": "${nic.id}", "primary": true }],
                },
                "storageProfile": {
                    "imageReference": {
                        "publisher": "Canonical",
                        "offer": "UbuntuServer",
                        "sku": "16.04-LTS",
                        "version": "latest",
                    },
                    "osDisk": {
                        "createOption": "FromImage",
                        "osType": "Linux",
                        "caching": "ReadWrite",
                        "managedDisk": { "storageAccountType": "Standard_LRS" },
                    },
                },
            }),
        ),
        update(
            "allow-public-ip",
            &["storage", "pip", "vm"],
            "storage",
            json!({
                "publicNetworkAccess": "Enabled",
                "networkRuleSet": {
                    "defaultAction": "Allow",
                    "ipRules": [{ "value": "${pip.properties.ipAddress}", "action": "Allow" }],
                },
            }),
        ),
        update(
            "https-only",
            &["storage", "allow-public-ip"],
            "storage",
            json!({ "enableHttpsTrafficOnly": true }),
        ),
    ];

    PlanDefinition { steps }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_is_valid_and_ordered_as_declared() {
        let definition = plan(&RunConfig::default(), &Namer::default());
        let names: Vec<String> = definition.steps.iter().map(|s| s.name.clone()).collect();

        let plan = definition.into_plan().unwrap();
        let order: Vec<String> = plan
            .execution_order()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(order, names);
        assert_eq!(plan.len(), 11);
    }

    #[test]
    fn test_plan_uses_config() {
        let config = RunConfig {
            location: "westeurope".to_string(),
            storage_redundancy: crate::config::StorageRedundancy::StandardZrs,
            ..Default::default()
        };
        let definition = plan(&config, &Namer::new("t"));

        let storage = definition
            .steps
            .iter()
            .find(|s| s.name == "storage")
            .unwrap();
        let ActionDefinition::Create { spec, name, .. } = &storage.action else {
            panic!("expected create");
        };
        assert_eq!(spec["sku"]["name"], "Standard_ZRS");
        assert_eq!(spec["location"], "westeurope");
        assert!(name.starts_with("tsaname"));
    }
}
