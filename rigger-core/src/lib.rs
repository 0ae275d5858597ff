//! rigger-core: dependency-ordered resource provisioning with guaranteed teardown.
//!
//! A [`Plan`] is a validated DAG of [`Step`]s. The [`Orchestrator`] runs it
//! against a [`ProviderClient`], records a [`ResourceHandle`] per completed
//! step, and always tears down what it recorded, last created first.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use rigger_core::{CreateResource, Orchestrator, Plan, ResourceKind, SimProvider, Step};
//!
//! let plan = Plan::new(vec![
//!     Step::new("group", CreateResource::new(ResourceKind::ResourceGroup, "rg-demo")),
//!     Step::new("vnet", CreateResource::new(ResourceKind::Network, "vnet-demo").parent("${group.id}"))
//!         .depends_on(["group"]),
//! ])?;
//! let result = Orchestrator::new(Arc::new(SimProvider::new("sub"))).run(&plan).await;
//! assert!(result.succeeded);
//! ```

pub mod cancel;
pub mod context;
pub mod definition;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod plan;
pub mod provider;
pub mod result;
pub mod step;
pub mod template;

pub use cancel::Cancellation;
pub use definition::{ActionDefinition, PlanDefinition, StepDefinition};
pub use error::{PlanError, StepError};
pub use handle::{ResourceHandle, ResourceId, ResourceKind};
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use plan::Plan;
pub use provider::{ProviderClient, ProviderError, ResourceSpec, SimProvider};
pub use result::{ErrorInfo, ErrorKind, RunPhase, RunResult, TeardownError};
pub use step::{CreateResource, Rollback, Step, StepAction, StepInputs, StepState, UpdateResource};
