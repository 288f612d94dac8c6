//! fixlat acceptor
//!
//! Listens for the initiator, answers every Execution Report with a fill and
//! reports the dispatch latency of the inbound messages.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use fixlat_common::{
    AcceptorRun, CpuProfiler, HarnessConfig, LogConfig, Overrides, Role, RunContext, init_logging,
    log_report,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "fixlat-acceptor")]
#[command(author, version, about = "fixlat acceptor - answer fills and sample dispatch latency")]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "FIXLAT_CONFIG", default_value = "config/acceptor.toml")]
    config: PathBuf,

    /// Number of messages to sample (overrides the file)
    #[arg(short = 'n', long, env = "FIXLAT_SAMPLE_SIZE")]
    sample_size: Option<usize>,

    /// Give up waiting for the sample after this long, e.g. "30s"
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

    let run = AcceptorRun::start(&config).await?;
    if let Some(addr) = run.local_addr() {
        info!(%addr, config = %cli.config.display(), "fixlat acceptor started");
    }
    let outcome = run.finish().await;

    log_report(Role::Acceptor, &outcome.summary, &RunContext::capture());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpuprofile_flag_is_optional() {
        let cli = Cli::try_parse_from(["fixlat-acceptor"]).unwrap();
        assert!(cli.cpuprofile.is_none());
        assert!(cli.sample_size.is_none());
    }

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::try_parse_from([
            "fixlat-acceptor",
            "--cpuprofile",
            "/tmp/acceptor.svg",
            "-n",
            "50",
            "--timeout",
            "5s",
            "--settle",
            "250ms",
        ])
        .unwrap();
        assert_eq!(cli.cpuprofile, Some(PathBuf::from("/tmp/acceptor.svg")));

        let overrides = cli.overrides();
        assert_eq!(overrides.sample_size, Some(50));
        assert_eq!(overrides.completion_timeout, Some(Duration::from_secs(5)));
        assert_eq!(overrides.settle_delay, Some(Duration::from_millis(250)));
        assert!(overrides.diagnostics_listen.is_none());
    }
}
