//! Simmem - agent memory simulation driver
//!
//! The `simmem` command drives one agent memory through a number of
//! simulation steps and reports what it ended up holding.
//!
//! ## Commands
//!
//! - `run`: Simulate an agent perceiving, memorizing and renewing options
//! - `policies`: List the built-in eviction policies

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};

use simmem_core::{
    init_tracing, Capacity, ManualClock, Memory, MemoryConfig, MemoryEvent, MemoryListener,
    MemoryName, OverwriteMemory, PolicyKind, Property, Retention, StatsSnapshot, Step, ValueKind,
};
use simmem_store::VersionPolicy;

#[derive(Parser)]
#[command(name = "simmem")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded, time-versioned memory for simulated agents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive one agent memory through a number of steps and print a report
    Run(RunArgs),

    /// List the built-in eviction policies
    Policies,
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Number of simulation steps
    #[arg(short, long, default_value_t = 10)]
    steps: u64,

    /// Maximum number of stored properties (default: unlimited)
    #[arg(short, long)]
    capacity: Option<usize>,

    /// Eviction policy: fifo, filo or nino
    #[arg(short, long)]
    policy: Option<PolicyKind>,

    /// Steps a memorized option stays alive (default: unlimited)
    #[arg(short, long)]
    retention: Option<u64>,

    /// Options perceived per step
    #[arg(short, long, default_value_t = 3)]
    options: usize,

    /// Keep one version per key instead of the full history
    #[arg(long)]
    overwrite: bool,

    /// JSON memory config; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Memory name used in logs and the report
    #[arg(long)]
    name: Option<String>,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    report: ReportFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Json,
    #[default]
    Text,
}

/// What a simulation run left behind.
#[derive(Debug, Serialize)]
struct SimulationReport {
    name: String,
    variant: &'static str,
    policy: &'static str,
    capacity: Capacity,
    steps: u64,
    options_per_step: usize,
    final_size: usize,
    keys: Vec<String>,
    best: Option<Property>,
    stats: StatsSnapshot,
    generated_at: DateTime<Utc>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => cmd_run(&args).await,
        Commands::Policies => cmd_policies(),
    }
}

/// Build the memory config from the optional JSON file plus flag overrides.
async fn load_config(args: &RunArgs) -> Result<MemoryConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            MemoryConfig::from_json(&json)
                .with_context(|| format!("Invalid config: {}", path.display()))?
        }
        None => MemoryConfig::new("agent"),
    };

    if let Some(name) = &args.name {
        config.name = MemoryName::new(name.as_str());
    }
    if let Some(capacity) = args.capacity {
        config.capacity = Capacity::Bounded(capacity);
    }
    if let Some(policy) = args.policy {
        config.policy = policy;
    }
    if let Some(retention) = args.retention {
        config.default_retention = Retention::Steps(retention);
    }
    Ok(config)
}

/// Run a simulation and print its report
async fn cmd_run(args: &RunArgs) -> Result<()> {
    let report = run_simulation(args).await?;
    match args.report {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Text => print_text_report(&report),
    }
    Ok(())
}

async fn run_simulation(args: &RunArgs) -> Result<SimulationReport> {
    let config = load_config(args).await?;
    info!(
        memory = %config.name,
        capacity = %config.capacity,
        policy = %config.policy,
        retention = %config.default_retention,
        overwrite = args.overwrite,
        "starting simulation"
    );

    let clock = Arc::new(ManualClock::new());
    if args.overwrite {
        let mut memory = OverwriteMemory::overwrite(config, clock.clone())
            .context("Failed to build overwrite memory")?;
        simulate(&mut memory, &clock, args)
    } else {
        let mut memory =
            Memory::versioned(config, clock.clone()).context("Failed to build memory")?;
        simulate(&mut memory, &clock, args)
    }
}

/// Each step the agent perceives `options` scored options, memorizes them,
/// recalls every number it still holds and renews the best one.
fn simulate<P: VersionPolicy>(
    memory: &mut Memory<P>,
    clock: &ManualClock,
    args: &RunArgs,
) -> Result<SimulationReport> {
    let steps = Step::try_from(args.steps).context("Step count out of range")?;
    let trace: Arc<dyn MemoryListener> = Arc::new(|event: MemoryEvent, p: &Property| {
        debug!(event = %event, key = p.key(), step = p.timestamp(), "memory event");
    });
    for event in [
        MemoryEvent::Evicted,
        MemoryEvent::Rejected,
        MemoryEvent::Forgotten,
    ] {
        memory.add_observer(event, Arc::clone(&trace));
    }

    let mut best = None;
    for step in 0..steps {
        clock.set(step);
        memory.check_if_new_step();

        for option in 0..args.options {
            let property = Property::new(format!("option-{option}"), step, utility(step, option));
            memory
                .memorize(property)
                .with_context(|| format!("Failed to memorize option {option} at step {step}"))?;
        }

        let candidate = memory
            .recall_all(ValueKind::Number)
            .into_iter()
            .max_by_key(|p| p.value().as_i64().unwrap_or(i64::MIN));
        if let Some(candidate) = candidate {
            let renewed = memory
                .refresh(&candidate)
                .with_context(|| format!("Failed to refresh {}", candidate.key()))?;
            best = Some(renewed);
        }
    }

    memory.stats().flush(memory.name());

    Ok(SimulationReport {
        name: memory.name().to_string(),
        variant: P::NAME,
        policy: memory.capacity_manager().name(),
        capacity: memory.capacity(),
        steps: args.steps,
        options_per_step: args.options,
        final_size: memory.len(),
        keys: memory.keys(),
        best,
        stats: memory.stats().snapshot(),
        generated_at: Utc::now(),
    })
}

/// Deterministic score for an option perceived at `step`.
fn utility(step: Step, option: usize) -> i64 {
    let option = i64::try_from(option).unwrap_or(i64::MAX);
    (step.wrapping_mul(7919).wrapping_add(option.wrapping_mul(104_729))).rem_euclid(100)
}

fn print_text_report(report: &SimulationReport) {
    println!("Memory:    {} ({})", report.name, report.variant);
    println!("Policy:    {} (capacity {})", report.policy, report.capacity);
    println!(
        "Steps:     {} x {} options",
        report.steps, report.options_per_step
    );
    println!("Size:      {}", report.final_size);
    println!("Keys:      {}", report.keys.join(", "));
    if let Some(best) = &report.best {
        println!("Best:      {}", best);
    }
    println!();
    let s = &report.stats;
    println!("  memorized  {}", s.memorized);
    println!("  refreshed  {}", s.refreshed);
    println!("  recalled   {}", s.recalled);
    println!("  forgotten  {}", s.forgotten);
    println!("  expired    {}", s.expired);
    println!("  evicted    {}", s.evicted);
    println!("  rejected   {}", s.rejected);
}

/// List built-in eviction policies
fn cmd_policies() -> Result<()> {
    for policy in PolicyKind::ALL {
        println!("{:<6} {}", policy, policy.description());
    }
    Ok(())
}
