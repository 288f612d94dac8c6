//! fixlat initiator
//!
//! Connects to the acceptor, sends a burst of identical Execution Reports and
//! reports the dispatch latency of the fills that come back.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use fixlat_common::{
    CpuProfiler, HarnessConfig, LogConfig, Overrides, Role, RunContext, init_logging, log_report,
    run_initiator,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "fixlat-initiator")]
#[command(author, version, about = "fixlat initiator - send a burst and sample reply latency")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "FIXLAT_CONFIG", default_value = "config/initiator.toml")]
    config: PathBuf,

    /// Number of messages to send and sample (overrides the file)
    #[arg(short = 'n', long, env = "FIXLAT_SAMPLE_SIZE")]
    sample_size: Option<usize>,

    /// Deadline for logon and for the closing marker, e.g. "30s"
    #[arg(long, env = "FIXLAT_TIMEOUT", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Pause between completion and reporting, e.g. "500ms"
    #[arg(long, env = "FIXLAT_SETTLE", value_parser = humantime::parse_duration)]
    settle: Option<Duration>,

    /// Serve /health and /debug/progress on this address
    #[arg(long, env = "FIXLAT_DIAGNOSTICS")]
    diagnostics: Option<SocketAddr>,

    /// Write a CPU flamegraph (SVG) covering the whole run to this file
    #[arg(long, env = "FIXLAT_CPUPROFILE")]
    cpuprofile: Option<PathBuf>,

    /// Also print the summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            sample_size: self.sample_size,
            completion_timeout: self.timeout,
            settle_delay: self.settle,
            diagnostics_listen: self.diagnostics,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info").with_stderr();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    let _logging_guards = init_logging(&log_config)?;

    let profiler = cli
        .cpuprofile
        .as_deref()
        .map(|path| CpuProfiler::start(path))
        .transpose()
        .context("failed to start CPU profiler")?;

    let mut config = HarnessConfig::load(&cli.config)?;
    config.apply_overrides(&cli.overrides());
    info!(
        config = %cli.config.display(),
        target = config.session.socket_connect_address.as_deref().unwrap_or("-"),
        "fixlat initiator starting"
    );

    let outcome = run_initiator(&config).await?;

    log_report(Role::Initiator, &outcome.summary, &RunContext::capture());
    if let Some(profiler) = profiler {
        let path = profiler.finish().context("failed to write CPU profile")?;
        info!(path = %path.display(), "cpu profile written");
    }
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("failed to serialize summary")?
        );
    }
    Ok(ExitCode::from(outcome.exit_code()))
}
