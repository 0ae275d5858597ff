//! End-to-end orchestrator behaviour against the simulated provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rigger_core::provider::ProviderCall;
use rigger_core::{
    Cancellation, CreateResource, ErrorKind, Orchestrator, OrchestratorOptions, Plan,
    ProviderClient, ProviderError, ResourceHandle, ResourceId, ResourceKind, Rollback,
    SimProvider, Step, StepAction, StepError, StepInputs, StepState, UpdateResource,
};
use serde_json::json;

fn network_chain() -> Vec<Step> {
    vec![
        Step::new(
            "group",
            CreateResource::new(ResourceKind::ResourceGroup, "rg-demo")
                .spec(json!({ "location": "eastus" })),
        ),
        Step::new(
            "vnet",
            CreateResource::new(ResourceKind::Network, "vnet-demo")
                .parent("${group.id}")
                .spec(json!({
                    "location": "${group.properties.location}",
                    "addressSpace": { "addressPrefixes": ["10.0.0.0/28"] },
                })),
        )
        .depends_on(["group"]),
        Step::new(
            "subnet",
            CreateResource::new(ResourceKind::Subnet, "subnet-demo")
                .parent("${vnet.id}")
                .spec(json!({
                    "addressPrefix": "10.0.0.8/29",
                    "serviceEndpoints": [{ "service": "Microsoft.Storage" }],
                })),
        )
        .depends_on(["vnet"]),
    ]
}

/// Linear chain of independent resource groups rg-0 -> rg-1 -> ...
fn group_chain(n: usize) -> Vec<Step> {
    (0..n)
        .map(|i| {
            let step = Step::new(
                format!("step-{}", i),
                CreateResource::new(ResourceKind::ResourceGroup, format!("rg-{}", i)),
            );
            if i == 0 {
                step
            } else {
                step.depends_on([format!("step-{}", i - 1)])
            }
        })
        .collect()
}

fn orchestrator(sim: &Arc<SimProvider>) -> Orchestrator {
    Orchestrator::new(Arc::clone(sim) as Arc<dyn ProviderClient>)
}

async fn deleted_ids(sim: &SimProvider) -> Vec<ResourceId> {
    sim.journal()
        .await
        .into_iter()
        .filter_map(|call| match call {
            ProviderCall::Delete { id } => Some(id),
            _ => None,
        })
        .collect()
}

fn group_id(name: &str) -> ResourceId {
    ResourceId::new(format!("/subscriptions/sub/resourceGroups/{}", name))
}

#[tokio::test]
async fn test_successful_run_records_and_tears_down_everything() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(network_chain()).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert!(result.error.is_none());
    assert_eq!(result.steps_completed, vec!["group", "vnet", "subnet"]);
    assert_eq!(result.steps_completed.len(), plan.len());
    assert_eq!(result.handles.len(), plan.len());
    assert_eq!(result.torn_down, vec!["subnet", "vnet", "group"]);
    assert!(result.teardown_errors.is_empty());
    assert!(sim.resources().await.is_empty());

    let subnet = &result.handles[2].handle;
    assert_eq!(subnet.kind, ResourceKind::Subnet);
    assert_eq!(
        subnet.property("serviceEndpoints.0.service"),
        Some(&json!("Microsoft.Storage"))
    );
    assert!(subnet.id.is_descendant_of(&result.handles[0].handle.id));
}

#[tokio::test]
async fn test_group_deletion_cascades_when_children_skip_rollback() {
    let sim = Arc::new(SimProvider::new("sub"));
    let steps = network_chain()
        .into_iter()
        .map(|s| {
            if s.name() == "group" {
                s
            } else {
                s.with_rollback(Rollback::Skip)
            }
        })
        .collect();
    let plan = Plan::new(steps).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert_eq!(result.torn_down, vec!["group"]);
    assert_eq!(deleted_ids(&sim).await, vec![group_id("rg-demo")]);
    assert!(sim.resources().await.is_empty());
}

#[tokio::test]
async fn test_quota_failure_at_step_two_tears_down_step_one() {
    let sim = Arc::new(SimProvider::new("sub"));
    sim.fail_create(
        "vnet-demo",
        ProviderError::new(409, "QuotaExceeded", "virtual network quota reached"),
    )
    .await;
    let plan = Plan::new(network_chain()).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(!result.succeeded);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Provider);
    assert_eq!(error.step.as_deref(), Some("vnet"));
    assert_eq!(error.code.as_deref(), Some("QuotaExceeded"));

    assert_eq!(result.steps_completed, vec!["group"]);
    assert_eq!(result.torn_down, vec!["group"]);
    assert_eq!(deleted_ids(&sim).await, vec![group_id("rg-demo")]);
    assert_eq!(result.state_of("vnet"), Some(StepState::Failed));
    assert_eq!(result.state_of("subnet"), Some(StepState::Pending));
    assert!(sim.resources().await.is_empty());
}

#[tokio::test]
async fn test_failure_at_step_k_tears_down_previous_steps_in_reverse() {
    for k in 1..=5 {
        let sim = Arc::new(SimProvider::new("sub"));
        sim.fail_create(
            &format!("rg-{}", k - 1),
            ProviderError::new(500, "InternalServerError", "boom"),
        )
        .await;
        let plan = Plan::new(group_chain(5)).unwrap();

        let result = orchestrator(&sim).run(&plan).await;

        assert!(!result.succeeded, "k = {}", k);
        assert_eq!(result.steps_completed.len(), k - 1, "k = {}", k);
        let expected: Vec<ResourceId> = (0..k - 1)
            .rev()
            .map(|i| group_id(&format!("rg-{}", i)))
            .collect();
        assert_eq!(deleted_ids(&sim).await, expected, "k = {}", k);
    }
}

#[tokio::test]
async fn test_teardown_is_lifo() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(group_chain(3)).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert_eq!(result.torn_down, vec!["step-2", "step-1", "step-0"]);
    assert_eq!(
        deleted_ids(&sim).await,
        vec![group_id("rg-2"), group_id("rg-1"), group_id("rg-0")]
    );
}

#[tokio::test]
async fn test_teardown_failure_does_not_stop_remaining_deletes() {
    let sim = Arc::new(SimProvider::new("sub"));
    sim.fail_delete("rg-2", ProviderError::new(409, "ScopeLocked", "locked"))
        .await;
    let plan = Plan::new(group_chain(4)).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert!(result.error.is_none());
    assert!(result.has_orphans());
    assert_eq!(result.teardown_errors.len(), 1);
    assert_eq!(result.teardown_errors[0].step, "step-2");
    assert_eq!(result.orphaned().collect::<Vec<_>>(), vec![&group_id("rg-2")]);
    assert_eq!(result.torn_down, vec!["step-3", "step-1", "step-0"]);
    assert_eq!(sim.resources().await.len(), 1);
}

#[tokio::test]
async fn test_teardown_error_does_not_mask_step_failure() {
    let sim = Arc::new(SimProvider::new("sub"));
    sim.fail_create("rg-2", ProviderError::new(409, "QuotaExceeded", "quota"))
        .await;
    sim.fail_delete("rg-0", ProviderError::new(500, "InternalServerError", "boom"))
        .await;
    let plan = Plan::new(group_chain(3)).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(!result.succeeded);
    assert_eq!(result.error.unwrap().code.as_deref(), Some("QuotaExceeded"));
    assert_eq!(result.teardown_errors[0].step, "step-0");
    assert_eq!(result.torn_down, vec!["step-1"]);
}

#[tokio::test]
async fn test_zero_steps_is_a_successful_noop() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(vec![]).unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert!(result.steps_completed.is_empty());
    assert!(result.torn_down.is_empty());
    assert!(result.teardown_errors.is_empty());
    assert!(sim.journal().await.is_empty());
}

#[tokio::test]
async fn test_idempotent_create_yields_same_handle() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(vec![
        Step::new("group", CreateResource::new(ResourceKind::ResourceGroup, "rg")),
        Step::new("group-again", CreateResource::new(ResourceKind::ResourceGroup, "rg"))
            .depends_on(["group"]),
    ])
    .unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert_eq!(result.handles[0].handle.id, result.handles[1].handle.id);
    assert_eq!(
        result.handles[0].handle.created_at,
        result.handles[1].handle.created_at
    );
    // The second delete finds the group already gone.
    assert_eq!(result.torn_down, vec!["group-again", "group"]);
    assert!(result.teardown_errors.is_empty());
}

#[tokio::test]
async fn test_update_steps_are_not_rolled_back() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(vec![
        Step::new("group", CreateResource::new(ResourceKind::ResourceGroup, "rg")),
        Step::new(
            "storage",
            CreateResource::new(ResourceKind::StorageAccount, "sademo")
                .parent("${group.id}")
                .spec(json!({ "networkRuleSet": { "defaultAction": "Deny" } })),
        )
        .depends_on(["group"]),
        Step::new(
            "https-only",
            UpdateResource::new("storage", json!({ "enableHttpsTrafficOnly": true })),
        )
        .depends_on(["storage"]),
    ])
    .unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert_eq!(result.steps_completed.len(), 3);
    let patched = &result.handles[2].handle;
    assert_eq!(patched.property("enableHttpsTrafficOnly"), Some(&json!(true)));
    assert_eq!(
        patched.property("networkRuleSet.defaultAction"),
        Some(&json!("Deny"))
    );
    assert_eq!(result.torn_down, vec!["storage", "group"]);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let sim = Arc::new(SimProvider::new("sub"));
    let cancel = Cancellation::new();
    cancel.cancel("interrupted");
    let plan = Plan::new(network_chain()).unwrap();

    let result = orchestrator(&sim)
        .with_cancellation(cancel)
        .run(&plan)
        .await;

    assert!(!result.succeeded);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Cancelled);
    assert!(result.steps_completed.is_empty());
    assert!(result.steps.iter().all(|s| s.state == StepState::Pending));
    assert!(sim.journal().await.is_empty());
}

/// Creates a resource group, then requests cancellation.
struct CancelAfter {
    inner: CreateResource,
    cancel: Cancellation,
}

#[async_trait]
impl StepAction for CancelAfter {
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle, StepError> {
        let handle = self.inner.execute(provider, inputs).await?;
        self.cancel.cancel("timeout");
        Ok(handle)
    }
}

#[tokio::test]
async fn test_cancellation_stops_at_step_boundary_and_still_tears_down() {
    let sim = Arc::new(SimProvider::new("sub"));
    let cancel = Cancellation::new();
    let mut steps = group_chain(3);
    steps[1] = Step::new(
        "step-1",
        CancelAfter {
            inner: CreateResource::new(ResourceKind::ResourceGroup, "rg-1"),
            cancel: cancel.clone(),
        },
    )
    .depends_on(["step-0"]);
    let plan = Plan::new(steps).unwrap();

    let result = orchestrator(&sim)
        .with_cancellation(cancel)
        .run(&plan)
        .await;

    assert!(!result.succeeded);
    assert_eq!(result.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    // The in-flight step finished and was recorded; the next never started.
    assert_eq!(result.steps_completed, vec!["step-0", "step-1"]);
    assert_eq!(result.state_of("step-2"), Some(StepState::Pending));
    assert_eq!(result.torn_down, vec!["step-1", "step-0"]);
    assert!(sim.resources().await.is_empty());
}

/// Reads an output it never declared.
struct ReadsUndeclared;

#[async_trait]
impl StepAction for ReadsUndeclared {
    async fn execute(
        &self,
        _provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle, StepError> {
        inputs.dependency("group").cloned()
    }
}

#[tokio::test]
async fn test_undeclared_dependency_fails_the_step() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = Plan::new(vec![
        Step::new("group", CreateResource::new(ResourceKind::ResourceGroup, "rg")),
        Step::new("sneaky", ReadsUndeclared),
    ])
    .unwrap();

    let result = orchestrator(&sim).run(&plan).await;

    assert!(!result.succeeded);
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Dependency);
    assert_eq!(error.step.as_deref(), Some("sneaky"));
    assert_eq!(result.torn_down, vec!["group"]);
}

/// Sleeps before creating, so that sibling branches overlap.
struct Slow {
    inner: CreateResource,
    delay: Duration,
}

#[async_trait]
impl StepAction for Slow {
    async fn execute(
        &self,
        provider: &dyn ProviderClient,
        inputs: &StepInputs,
    ) -> Result<ResourceHandle, StepError> {
        tokio::time::sleep(self.delay).await;
        self.inner.execute(provider, inputs).await
    }
}

fn branching_plan(delay: Duration) -> Plan {
    Plan::new(vec![
        Step::new("group", CreateResource::new(ResourceKind::ResourceGroup, "rg")),
        Step::new(
            "vnet",
            Slow {
                inner: CreateResource::new(ResourceKind::Network, "vnet").parent("${group.id}"),
                delay,
            },
        )
        .depends_on(["group"]),
        Step::new(
            "vnet2",
            CreateResource::new(ResourceKind::Network, "vnet2").parent("${group.id}"),
        )
        .depends_on(["group"]),
        Step::new(
            "subnet",
            CreateResource::new(ResourceKind::Subnet, "subnet").parent("${vnet.id}"),
        )
        .depends_on(["vnet"]),
        Step::new(
            "subnet2",
            CreateResource::new(ResourceKind::Subnet, "subnet2").parent("${vnet2.id}"),
        )
        .depends_on(["vnet2"]),
    ])
    .unwrap()
}

#[tokio::test]
async fn test_parallel_branches_respect_dependencies() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = branching_plan(Duration::from_millis(50));

    let result = orchestrator(&sim)
        .with_options(OrchestratorOptions { max_parallel: 4 })
        .run(&plan)
        .await;

    assert!(result.succeeded);
    assert_eq!(result.steps_completed.len(), 5);
    let position = |name: &str| {
        result
            .steps_completed
            .iter()
            .position(|s| s == name)
            .unwrap()
    };
    assert!(position("group") < position("vnet"));
    assert!(position("vnet") < position("subnet"));
    assert!(position("vnet2") < position("subnet2"));
    // The fast branch finishes while the slow one is still sleeping.
    assert!(position("subnet2") < position("vnet"));

    let mut torn_down = result.torn_down.clone();
    torn_down.reverse();
    assert_eq!(torn_down, result.steps_completed);
    assert!(sim.resources().await.is_empty());
}

#[tokio::test]
async fn test_parallel_failure_records_in_flight_siblings() {
    let sim = Arc::new(SimProvider::new("sub"));
    sim.fail_create("vnet2", ProviderError::new(409, "QuotaExceeded", "quota"))
        .await;
    let plan = branching_plan(Duration::from_millis(50));

    let result = orchestrator(&sim)
        .with_options(OrchestratorOptions { max_parallel: 4 })
        .run(&plan)
        .await;

    assert!(!result.succeeded);
    assert_eq!(result.error.as_ref().unwrap().step.as_deref(), Some("vnet2"));
    // vnet was already running when vnet2 failed; it completes and is cleaned up.
    assert_eq!(result.steps_completed, vec!["group", "vnet"]);
    assert_eq!(result.state_of("subnet"), Some(StepState::Pending));
    assert_eq!(result.torn_down, vec!["vnet", "group"]);
    assert!(sim.resources().await.is_empty());
}

#[tokio::test]
async fn test_sequential_mode_follows_declaration_order() {
    let sim = Arc::new(SimProvider::new("sub"));
    let plan = branching_plan(Duration::from_millis(5));

    let result = orchestrator(&sim).run(&plan).await;

    assert!(result.succeeded);
    assert_eq!(
        result.steps_completed,
        vec!["group", "vnet", "vnet2", "subnet", "subnet2"]
    );
}
