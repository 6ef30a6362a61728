use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use workloads::WorkloadsConfig;

mod logging;
mod stresstest;
mod workloads;

/// Command line interface parser.
#[derive(Parser)]
struct Cli {
    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = humantime::parse_duration)]
    duration: Duration,

    /// Report to Sentry, using a local HTTP sink.
    #[arg(long)]
    sentry: bool,

    /// Enable tracing, with all events discarded.
    #[arg(long)]
    tracing: bool,

    /// Report metrics to a local statsd sink.
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;
    workloads
        .cache
        .validate()
        .context("invalid cache configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;

    let mut logging_guard = logging::init(logging::Config {
        sentry: cli.sentry,
        tracing: cli.tracing,
        metrics: cli.metrics,
    })?;

    if let Some(http_sink) = logging_guard.http_sink.take() {
        runtime.spawn(http_sink);
    }
    if let Some(udp_sink) = logging_guard.udp_sink.take() {
        runtime.spawn(udp_sink);
    }

    let result = runtime.block_on(stresstest::perform_stresstest(workloads, cli.duration));
    drop(logging_guard);
    result
}
