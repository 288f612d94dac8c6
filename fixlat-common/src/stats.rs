//! Statistics over a completed latency sample.
//!
//! Samples are stored in nanoseconds and reported in microseconds. The
//! standard deviation is the population form (divide by `n`).

use crate::types::Role;
use serde::{Serialize, Serializer};
use std::time::Duration;
use tracing::info;

/// Latency figures in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub mean_us: f64,
    pub max_us: f64,
    /// Position of the first occurrence of the maximum.
    pub max_index: usize,
    pub stdev_us: f64,
}

/// Outcome of [`reduce`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Number of latencies reduced.
    pub samples: usize,
    /// `None` when there were no samples.
    pub latency: Option<LatencyStats>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Messages processed over `elapsed`.
    pub message_count: u64,
    /// Messages per second.
    pub throughput: f64,
}

/// Reduce a sample to its summary.
pub fn reduce(samples_ns: &[i64], elapsed: Duration, message_count: u64) -> Summary {
    Summary {
        samples: samples_ns.len(),
        latency: latency_stats(samples_ns),
        elapsed,
        message_count,
        throughput: throughput(message_count, elapsed),
    }
}

/// Messages per second, or `0.0` if no time elapsed.
pub fn throughput(message_count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        message_count as f64 / secs
    } else {
        0.0
    }
}

fn latency_stats(samples_ns: &[i64]) -> Option<LatencyStats> {
    if samples_ns.is_empty() {
        return None;
    }
    let micros: Vec<f64> = samples_ns.iter().map(|&ns| ns as f64 / 1000.0).collect();
    let n = micros.len() as f64;
    let mean = micros.iter().sum::<f64>() / n;

    let (max_index, max_us) = micros
        .iter()
        .copied()
        .enumerate()
        .fold((0, micros[0]), |best, (i, v)| if v > best.1 { (i, v) } else { best });

    let variance = micros.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(LatencyStats {
        mean_us: mean,
        max_us,
        max_index,
        stdev_us: variance.sqrt(),
    })
}

fn serialize_secs<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

/// Machine facts printed alongside the statistics.
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub cpus: usize,
    pub runtime_workers: usize,
}

impl RunContext {
    /// Capture the host CPU count and, if inside a runtime, its worker count.
    pub fn capture() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let runtime_workers = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_workers())
            .unwrap_or(1);
        Self {
            cpus,
            runtime_workers,
        }
    }
}

/// Emit the statistics report through `tracing`.
pub fn log_report(role: Role, summary: &Summary, context: &RunContext) {
    let banner = role.banner();
    info!(">>>>>>>>>>> {banner} STATS <<<<<<<<<<<");
    info!("NumCPU: {}", context.cpus);
    info!("Runtime workers: {}", context.runtime_workers);
    match &summary.latency {
        Some(stats) => {
            info!("Sample mean is {} us", stats.mean_us);
            info!("Sample max is {} us ({})", stats.max_us, stats.max_index);
            info!("Standard Dev is {} us", stats.stdev_us);
        }
        None => info!("No latency samples recorded"),
    }
    info!(
        "Processed {} msg in {} [effective rate: {:.4} msg/s]",
        summary.message_count,
        humantime::format_duration(summary.elapsed),
        summary.throughput
    );
    info!("----------- {banner} STATS -----------");
}
