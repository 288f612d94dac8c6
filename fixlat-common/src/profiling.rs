//! Sampling CPU profiler with flamegraph output.
//!
//! Only one profiler can run per process. Starting a second one, whether from
//! `--cpuprofile` or the diagnostics listener, fails with
//! [`ProfileError::Profiler`].

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Samples per second.
pub const SAMPLE_FREQUENCY: i32 = 1000;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to create {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profiler error: {0}")]
    Profiler(String),

    #[error("failed to write flamegraph to {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("CPU profiling is not supported on this platform")]
    Unsupported,
}

/// Profiles the whole process until [`CpuProfiler::finish`].
pub struct CpuProfiler {
    path: PathBuf,
    file: File,
    #[cfg(unix)]
    guard: pprof::ProfilerGuard<'static>,
}

impl CpuProfiler {
    /// Create the output file and start sampling.
    pub fn start(path: impl Into<PathBuf>) -> Result<Self, ProfileError> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| ProfileError::Create {
            path: path.clone(),
            source,
        })?;
        Self::with_file(path, file)
    }

    #[cfg(unix)]
    fn with_file(path: PathBuf, file: File) -> Result<Self, ProfileError> {
        let guard = start_guard()?;
        tracing::info!(path = %path.display(), frequency = SAMPLE_FREQUENCY, "cpu profiler started");
        Ok(Self { path, file, guard })
    }

    #[cfg(not(unix))]
    fn with_file(_path: PathBuf, _file: File) -> Result<Self, ProfileError> {
        Err(ProfileError::Unsupported)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop sampling and write the flamegraph. Returns the output path.
    #[cfg(unix)]
    pub fn finish(self) -> Result<PathBuf, ProfileError> {
        let mut writer = std::io::BufWriter::new(self.file);
        write_flamegraph(&self.guard, &mut writer).map_err(|message| ProfileError::Write {
            path: self.path.clone(),
            message,
        })?;
        std::io::Write::flush(&mut writer).map_err(|e| ProfileError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(self.path)
    }

    #[cfg(not(unix))]
    pub fn finish(self) -> Result<PathBuf, ProfileError> {
        Err(ProfileError::Unsupported)
    }
}

/// Profile for `duration` on the calling thread and return the SVG.
///
/// Blocks; call it from `spawn_blocking`.
#[cfg(unix)]
pub fn capture_flamegraph(duration: Duration) -> Result<Vec<u8>, ProfileError> {
    let guard = start_guard()?;
    std::thread::sleep(duration);
    let mut svg = Vec::new();
    write_flamegraph(&guard, &mut svg).map_err(ProfileError::Profiler)?;
    Ok(svg)
}

#[cfg(not(unix))]
pub fn capture_flamegraph(_duration: Duration) -> Result<Vec<u8>, ProfileError> {
    Err(ProfileError::Unsupported)
}

#[cfg(unix)]
fn start_guard() -> Result<pprof::ProfilerGuard<'static>, ProfileError> {
    pprof::ProfilerGuardBuilder::default()
        .frequency(SAMPLE_FREQUENCY)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|e| ProfileError::Profiler(e.to_string()))
}

#[cfg(unix)]
fn write_flamegraph<W: std::io::Write>(
    guard: &pprof::ProfilerGuard<'static>,
    writer: W,
) -> Result<(), String> {
    let report = guard.report().build().map_err(|e| e.to_string())?;
    report.flamegraph(writer).map_err(|e| e.to_string())
}
