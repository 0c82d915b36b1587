//! Groupcast CLI binary.
//!
//! Group-key broadcast delivery simulation over mobility traces.
//!
//! # Commands
//!
//! - `run` - Run the full experiment sweep from a config and a trace
//! - `stats` - Recompute statistics from a stored delivery log
//! - `trace-info` - Parse a trace and print its dimensions

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use groupcast::{
    config::Config,
    runner::SweepRunner,
    sim::{Experiment, ExperimentId},
    stats::ExperimentStats,
    store::{DeliveryStore, JsonlStore},
    trace::load_linkdump,
    VERSION,
};

#[derive(Parser)]
#[command(name = "groupcast")]
#[command(version = VERSION)]
#[command(about = "Group-key broadcast delivery simulation", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full experiment sweep
    Run {
        /// Sweep configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Mobility trace (linkdump format)
        #[arg(short, long)]
        trace: PathBuf,

        /// Output directory for delivery logs
        #[arg(short, long, default_value = "results")]
        out: PathBuf,

        /// Also write per-experiment statistics JSON
        #[arg(long)]
        stats: bool,
    },

    /// Recompute statistics from a stored delivery log
    Stats {
        /// Delivery log (JSON Lines)
        #[arg(short, long)]
        log: PathBuf,

        /// group_limit the log was produced under
        #[arg(long)]
        group_limit: u32,

        /// group_size_limit the log was produced under
        #[arg(long)]
        group_size_limit: u32,

        /// Broadcast frequency the log was produced under
        #[arg(long)]
        frequency: u64,

        /// Simulation horizon in seconds (fixes the hour buckets)
        #[arg(long, default_value_t = 48 * 3600)]
        total_time: u64,
    },

    /// Parse a trace and print node/contact counts
    TraceInfo {
        /// Mobility trace (linkdump format)
        #[arg(short, long)]
        trace: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            config,
            trace,
            out,
            stats,
        } => cmd_run(config, trace, out, stats).await,
        Commands::Stats {
            log,
            group_limit,
            group_size_limit,
            frequency,
            total_time,
        } => cmd_stats(log, group_limit, group_size_limit, frequency, total_time),
        Commands::TraceInfo { trace } => cmd_trace_info(trace),
    }
}

async fn cmd_run(
    config_path: PathBuf,
    trace_path: PathBuf,
    out: PathBuf,
    write_stats: bool,
) -> anyhow::Result<()> {
    let config = Config::from_file(config_path.clone())
        .with_context(|| format!("loading config {}", config_path.display()))?
        .apply_env();
    config.validate()?;

    let graph = load_linkdump(&trace_path)
        .with_context(|| format!("loading trace {}", trace_path.display()))?;
    let total_time = config.total_time;

    let store = Arc::new(JsonlStore::new(out.clone())?);
    let runner = SweepRunner::new(config, graph, store.clone());
    let report = runner.run().await?;

    for outcome in &report.outcomes {
        match outcome.delivery_count {
            Some(count) => println!(
                "experiment {}: {} deliveries -> {}",
                outcome.experiment.id,
                count,
                store.log_path(outcome.experiment.id).display()
            ),
            None => println!(
                "experiment {}: FAILED ({})",
                outcome.experiment.id,
                outcome.error.as_deref().unwrap_or("unknown")
            ),
        }
    }

    if write_stats {
        for outcome in report.outcomes.iter().filter(|o| o.succeeded()) {
            let deliveries = store.deliveries(outcome.experiment.id)?;
            let stats = ExperimentStats::collect(&outcome.experiment, &deliveries, total_time);
            let path = out.join(format!("statistics_{}.json", outcome.experiment.id));
            std::fs::write(&path, serde_json::to_string_pretty(&stats)?)?;
            println!("statistics -> {}", path.display());
        }
    }

    if report.failed() > 0 {
        anyhow::bail!("{} of {} experiments failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}

fn cmd_stats(
    log: PathBuf,
    group_limit: u32,
    group_size_limit: u32,
    frequency: u64,
    total_time: u64,
) -> anyhow::Result<()> {
    let deliveries =
        JsonlStore::read_log(&log).with_context(|| format!("reading log {}", log.display()))?;
    let experiment = Experiment {
        id: ExperimentId::new(0),
        group_limit,
        group_size_limit,
        broadcast_frequency: frequency,
        baseline: false,
    };
    let stats = ExperimentStats::collect(&experiment, &deliveries, total_time);
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn cmd_trace_info(trace: PathBuf) -> anyhow::Result<()> {
    let graph =
        load_linkdump(&trace).with_context(|| format!("loading trace {}", trace.display()))?;
    println!("nodes:    {}", graph.node_count());
    println!("contacts: {}", graph.contact_count());
    Ok(())
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();
}
