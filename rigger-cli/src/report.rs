//! Terminal and JSON output.

use clap::ValueEnum;
use rigger_core::{Plan, RunResult, StepState};
use tabled::{Table, Tabled};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "STEP")]
    name: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "RESOURCE")]
    resource: String,
}

#[derive(Tabled)]
struct OrphanRow {
    #[tabled(rename = "STEP")]
    step: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "RESOURCE")]
    resource: String,
    #[tabled(rename = "ERROR")]
    error: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "STEP")]
    name: String,
    #[tabled(rename = "DEPENDS ON")]
    depends_on: String,
    #[tabled(rename = "ROLLBACK")]
    rollback: String,
}

fn format_state(state: StepState) -> &'static str {
    match state {
        StepState::Pending => "not started",
        StepState::Running => "running",
        StepState::Completed => "completed",
        StepState::Failed => "FAILED",
    }
}

/// Human-readable summary of a finished run.
pub fn render_run(result: &RunResult) -> String {
    let rows: Vec<StepRow> = result
        .steps
        .iter()
        .map(|step| {
            let handle = result
                .handles
                .iter()
                .find(|h| h.step == step.name)
                .map(|h| &h.handle);
            StepRow {
                name: step.name.clone(),
                state: format_state(step.state).to_string(),
                kind: handle.map(|h| h.kind.to_string()).unwrap_or_else(|| "-".to_string()),
                resource: handle
                    .map(|h| h.id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            }
        })
        .collect();

    let mut out = String::new();
    let elapsed = result.finished_at - result.started_at;
    out.push_str(&format!(
        "Run {} ({} ms)\n",
        result.run_id,
        elapsed.num_milliseconds()
    ));
    if !rows.is_empty() {
        out.push_str(&format!("{}\n", Table::new(rows)));
    }

    match &result.error {
        None => out.push_str(&format!(
            "Succeeded: {} step(s) completed\n",
            result.steps_completed.len()
        )),
        Some(error) if error.transient => out.push_str(&format!(
            "Failed: {} (transient, a retry may succeed)\n",
            error
        )),
        Some(error) => out.push_str(&format!("Failed: {}\n", error)),
    }

    if result.torn_down.is_empty() && result.teardown_errors.is_empty() {
        out.push_str("Teardown: nothing to clean up\n");
    } else {
        let mut line = format!("Teardown: {} resource(s) removed", result.torn_down.len());
        if !result.torn_down.is_empty() {
            line.push_str(&format!(" ({})", result.torn_down.join(", ")));
        }
        if !result.teardown_errors.is_empty() {
            line.push_str(&format!(", {} left behind", result.teardown_errors.len()));
        }
        out.push_str(&line);
        out.push('\n');
    }

    if result.has_orphans() {
        let orphans: Vec<OrphanRow> = result
            .teardown_errors
            .iter()
            .map(|e| OrphanRow {
                step: e.step.clone(),
                kind: e.kind.to_string(),
                resource: e.resource_id.to_string(),
                error: e.error.to_string(),
            })
            .collect();
        out.push_str("Manual cleanup required:\n");
        out.push_str(&format!("{}\n", Table::new(orphans)));
    }

    out
}

/// Execution order of a validated plan.
pub fn render_plan(plan: &Plan) -> String {
    let rows: Vec<PlanRow> = plan
        .execution_order()
        .enumerate()
        .map(|(i, step)| PlanRow {
            position: i + 1,
            name: step.name().to_string(),
            depends_on: if step.dependencies().is_empty() {
                "-".to_string()
            } else {
                step.dependencies().join(", ")
            },
            rollback: format!("{:?}", step.rollback()).to_lowercase(),
        })
        .collect();

    if rows.is_empty() {
        return "Plan has no steps\n".to_string();
    }
    format!("{}\n", Table::new(rows))
}

pub fn render_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
