//! Orchestrator: runs a plan's steps in dependency order, records every
//! resource they create, and tears all of it down again when the run ends.
//!
//! Teardown is unconditional once a run has started. Whether anything has to
//! be cleaned up is decided by the teardown stack being empty, never by the
//! kind of failure that ended the run.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cancel::Cancellation;
use crate::context::RunContext;
use crate::error::StepError;
use crate::handle::ResourceHandle;
use crate::plan::Plan;
use crate::provider::ProviderClient;
use crate::result::{
    ErrorInfo, RecordedHandle, RunPhase, RunResult, StepOutcome, TeardownError,
};
use crate::step::{Rollback, StepState};

/// Orchestrator options.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Maximum number of steps in flight. 1 runs the plan strictly sequentially.
    pub max_parallel: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self { max_parallel: 1 }
    }
}

/// Mutable state of one run. Owned by a single `run` call.
struct Run {
    id: Uuid,
    phase: RunPhase,
    context: RunContext,
    states: Vec<StepState>,
    completed: Vec<String>,
    /// Plan indices of completed steps; popped for LIFO teardown.
    teardown_stack: Vec<usize>,
    error: Option<ErrorInfo>,
    torn_down: Vec<String>,
    teardown_errors: Vec<TeardownError>,
}

impl Run {
    fn new(steps: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase: RunPhase::Running,
            context: RunContext::new(),
            states: vec![StepState::Pending; steps],
            completed: Vec::new(),
            teardown_stack: Vec::new(),
            error: None,
            torn_down: Vec::new(),
            teardown_errors: Vec::new(),
        }
    }

    /// Keep the first error; later ones are consequences of it.
    fn fail(&mut self, error: ErrorInfo) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn transition(&mut self, phase: RunPhase) {
        debug!(run_id = %self.id, from = ?self.phase, to = ?phase, "Run phase change");
        self.phase = phase;
    }
}

/// Runs plans against a provider.
pub struct Orchestrator {
    provider: Arc<dyn ProviderClient>,
    options: OrchestratorOptions,
    cancellation: Cancellation,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn ProviderClient>) -> Self {
        Self {
            provider,
            options: OrchestratorOptions::default(),
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Handle that cancels runs of this orchestrator.
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    /// Execute `plan`, then tear down everything it created.
    pub async fn run(&self, plan: &Plan) -> RunResult {
        let started_at = Utc::now();
        let mut run = Run::new(plan.len());
        info!(
            run_id = %run.id,
            steps = plan.len(),
            max_parallel = self.options.max_parallel,
            "Starting run"
        );

        self.execute(plan, &mut run).await;

        if let Some(error) = &run.error {
            error!(run_id = %run.id, "Run failed: {}", error);
            run.transition(RunPhase::Failed);
        } else {
            info!(run_id = %run.id, "All {} steps completed", run.completed.len());
            run.transition(RunPhase::Succeeded);
        }
        let succeeded = run.phase == RunPhase::Succeeded;

        run.transition(RunPhase::TearingDown);
        self.teardown(plan, &mut run).await;
        run.transition(RunPhase::Finished);

        info!(
            run_id = %run.id,
            succeeded,
            completed = run.completed.len(),
            torn_down = run.torn_down.len(),
            orphaned = run.teardown_errors.len(),
            "Run finished"
        );

        let Run {
            id,
            phase,
            context,
            states,
            completed,
            error,
            torn_down,
            teardown_errors,
            ..
        } = run;

        RunResult {
            run_id: id,
            succeeded,
            error,
            steps_completed: completed,
            steps: plan
                .steps()
                .iter()
                .zip(states)
                .map(|(step, state)| StepOutcome {
                    name: step.name().to_string(),
                    state,
                })
                .collect(),
            handles: context
                .into_handles()
                .into_iter()
                .map(|(step, handle)| RecordedHandle { step, handle })
                .collect(),
            torn_down,
            teardown_errors,
            phase,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Forward phase: run steps until all completed, one failed, or cancelled.
    async fn execute(&self, plan: &Plan, run: &mut Run) {
        let max_parallel = self.options.max_parallel.max(1);
        let mut pending: Vec<usize> = (0..plan.len())
            .map(|i| plan.dependencies_of(i).len())
            .collect();
        let mut ready: BTreeSet<usize> = (0..plan.len()).filter(|&i| pending[i] == 0).collect();
        let mut in_flight: BTreeSet<usize> = BTreeSet::new();
        let mut tasks: JoinSet<(usize, Result<ResourceHandle, StepError>)> = JoinSet::new();
        let mut halted = false;

        loop {
            while !halted && in_flight.len() < max_parallel {
                let Some(index) = ready.pop_first() else {
                    break;
                };
                let step = &plan.steps()[index];

                if let Some(reason) = self.cancellation.reason() {
                    warn!(step = step.name(), "Cancelled before step started: {}", reason);
                    run.fail(ErrorInfo::cancelled(&reason, Some(step.name())));
                    halted = true;
                    break;
                }

                let inputs = match run.context.inputs_for(step) {
                    Ok(inputs) => inputs,
                    Err(e) => {
                        error!(step = step.name(), "Step inputs unavailable: {}", e);
                        run.states[index] = StepState::Failed;
                        run.fail(ErrorInfo::from_step_error(step.name(), &e));
                        halted = true;
                        break;
                    }
                };

                info!(step = step.name(), "Step running");
                run.states[index] = StepState::Running;
                in_flight.insert(index);

                let action = Arc::clone(step.action());
                let provider = Arc::clone(&self.provider);
                tasks.spawn(async move {
                    let result = action.execute(provider.as_ref(), &inputs).await;
                    (index, result)
                });
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = tasks.join_next() => joined,
                _ = self.cancellation.cancelled(), if !halted => {
                    let reason = self.cancellation.reason().unwrap_or_default();
                    warn!(
                        "Cancellation requested ({}), waiting for {} in-flight step(s)",
                        reason,
                        in_flight.len()
                    );
                    run.fail(ErrorInfo::cancelled(&reason, None));
                    halted = true;
                    continue;
                }
            };

            match joined {
                Some(Ok((index, Ok(handle)))) => {
                    in_flight.remove(&index);
                    let step = &plan.steps()[index];
                    if !run.context.record(step.name(), handle) {
                        // Write-once: a second output for the same step is a bug.
                        error!(step = step.name(), "Step output recorded twice");
                        run.states[index] = StepState::Failed;
                        run.fail(ErrorInfo::internal(
                            Some(step.name()),
                            "step output recorded twice",
                        ));
                        halted = true;
                        continue;
                    }
                    info!(step = step.name(), "Step completed");
                    run.states[index] = StepState::Completed;
                    run.completed.push(step.name().to_string());
                    run.teardown_stack.push(index);

                    for &dependent in plan.dependents_of(index) {
                        pending[dependent] -= 1;
                        if pending[dependent] == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
                Some(Ok((index, Err(e)))) => {
                    in_flight.remove(&index);
                    let step = &plan.steps()[index];
                    error!(step = step.name(), "Step failed: {}", e);
                    run.states[index] = StepState::Failed;
                    run.fail(ErrorInfo::from_step_error(step.name(), &e));
                    halted = true;
                }
                Some(Err(e)) => {
                    // The index is lost with the task; resolved after the loop.
                    error!("Step task aborted: {}", e);
                    run.fail(ErrorInfo::internal(None, format!("step task aborted: {}", e)));
                    halted = true;
                }
                None => break,
            }
        }

        for index in in_flight {
            let name = plan.steps()[index].name();
            run.states[index] = StepState::Failed;
            if let Some(error) = run.error.as_mut()
                && error.step.is_none()
            {
                error.step = Some(name.to_string());
            }
        }
    }

    /// Roll back every recorded step, last created first.
    async fn teardown(&self, plan: &Plan, run: &mut Run) {
        if run.teardown_stack.is_empty() {
            info!(run_id = %run.id, "Nothing was created, no cleanup necessary");
            return;
        }

        info!(
            run_id = %run.id,
            "Tearing down {} recorded resource(s)",
            run.teardown_stack.len()
        );

        while let Some(index) = run.teardown_stack.pop() {
            let step = &plan.steps()[index];
            let Some(handle) = run.context.get(step.name()) else {
                error!(step = step.name(), "No recorded handle for completed step");
                continue;
            };

            if step.rollback() == Rollback::Skip {
                debug!(step = step.name(), id = %handle.id, "Rollback skipped");
                continue;
            }

            info!(step = step.name(), kind = %handle.kind, id = %handle.id, "Deleting resource");
            match step.action().rollback(self.provider.as_ref(), handle).await {
                Ok(()) => {
                    info!(step = step.name(), id = %handle.id, "Deleted resource");
                    run.torn_down.push(step.name().to_string());
                }
                Err(e) if e.is_not_found() => {
                    info!(step = step.name(), id = %handle.id, "Resource already gone");
                    run.torn_down.push(step.name().to_string());
                }
                Err(e) => {
                    error!(
                        step = step.name(),
                        id = %handle.id,
                        "Failed to delete resource, manual cleanup required: {}",
                        e
                    );
                    run.teardown_errors.push(TeardownError {
                        step: step.name().to_string(),
                        kind: handle.kind,
                        resource_id: handle.id.clone(),
                        error: e,
                    });
                }
            }
        }
    }
}
