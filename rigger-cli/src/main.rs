//! rigger: provisions cloud resources in dependency order and always tears
//! them down again.
//!
//! Plans run against the simulated ARM provider. Without `--plan` the built-in
//! demo plan is used.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rigger_core::{
    Cancellation, Orchestrator, OrchestratorOptions, PlanDefinition, ProviderClient, SimProvider,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rigger_cli::report::{self, OutputFormat};
use rigger_cli::{ConfigOverrides, Credentials, Namer, RunConfig, demo, fault};

/// Exit status when teardown left resources behind and `fail_on_orphans` is set.
const EXIT_ORPHANS: u8 = 2;

#[derive(Parser)]
#[command(name = "rigger", version)]
#[command(about = "Provision cloud resources in dependency order with guaranteed teardown", long_about = None)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a plan, then tear down everything it created
    Run {
        /// Plan file (JSON); defaults to the built-in demo plan
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,

        /// Make the provider fail the given step
        #[arg(long)]
        fail_at: Option<String>,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip credential lookup and use the zero subscription
        #[arg(long)]
        anonymous: bool,
    },

    /// Validate a plan and print its execution order
    Plan {
        /// Plan file (JSON); defaults to the built-in demo plan
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so that JSON output stays parseable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rigger=info,rigger_cli=info,rigger_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            plan,
            config,
            overrides,
            fail_at,
            timeout,
            anonymous,
        } => {
            let config = load_config(config.as_deref(), &overrides).await?;
            let credentials = if anonymous {
                Credentials::anonymous()
            } else {
                Credentials::from_env().context("Failed to resolve credentials")?
            };
            info!(subscription = %credentials.subscription_id, "Using subscription");

            let definition = load_plan(plan.as_deref(), &config).await?;
            let mut plan = definition.into_plan().context("Invalid plan")?;
            if let Some(step) = &fail_at {
                plan = fault::inject_failure(&plan, step).context("--fail-at")?;
                info!(step = %step, "Injected provider failure");
            }

            let sim = Arc::new(
                SimProvider::new(credentials.subscription_id.clone())
                    .with_latency(Duration::from_millis(config.sim_latency_ms)),
            );

            let cancellation = Cancellation::new();
            watch_signals(cancellation.clone(), timeout);

            let orchestrator = Orchestrator::new(sim as Arc<dyn ProviderClient>)
                .with_options(OrchestratorOptions {
                    max_parallel: config.max_parallel,
                })
                .with_cancellation(cancellation);
            let result = orchestrator.run(&plan).await;

            match cli.output {
                OutputFormat::Text => print!("{}", report::render_run(&result)),
                OutputFormat::Json => println!("{}", report::render_json(&result)?),
            }

            if !result.succeeded {
                return Ok(ExitCode::FAILURE);
            }
            if result.has_orphans() && config.fail_on_orphans {
                return Ok(ExitCode::from(EXIT_ORPHANS));
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plan {
            plan,
            config,
            overrides,
        } => {
            let config = load_config(config.as_deref(), &overrides).await?;
            let definition = load_plan(plan.as_deref(), &config).await?;

            match cli.output {
                OutputFormat::Text => {
                    let plan = definition.into_plan().context("Invalid plan")?;
                    print!("{}", report::render_plan(&plan));
                }
                OutputFormat::Json => {
                    // Validate, but print the definition itself.
                    definition.clone().into_plan().context("Invalid plan")?;
                    println!("{}", report::render_json(&definition)?);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<RunConfig> {
    let mut config = RunConfig::load(path).await?;
    config.apply(overrides);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn load_plan(path: Option<&Path>, config: &RunConfig) -> Result<PlanDefinition> {
    let Some(path) = path else {
        return Ok(demo::plan(config, &Namer::new(config.name_prefix.clone())));
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    PlanDefinition::from_json(&content)
        .with_context(|| format!("Invalid plan file {}", path.display()))
}

/// Cancel on Ctrl-C or once `timeout` seconds have passed.
fn watch_signals(cancellation: Cancellation, timeout: Option<u64>) {
    let on_signal = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight steps before teardown");
            on_signal.cancel("interrupted");
        }
    });

    if let Some(secs) = timeout {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("Timeout of {}s reached, cancelling run", secs);
            cancellation.cancel(format!("timed out after {}s", secs));
        });
    }
}
