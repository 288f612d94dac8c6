//! Optional HTTP listener for watching a run in progress.
//!
//! Provides:
//! - `/health` - liveness and uptime
//! - `/debug/progress` - sample progress of this endpoint
//! - `/debug/pprof/flamegraph?seconds=N` - CPU flamegraph over N seconds

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::profiling::capture_flamegraph;
use crate::types::Role;

const DEFAULT_PROFILE_SECS: u64 = 10;
const MAX_PROFILE_SECS: u64 = 60;

/// Sample progress counters, updated from session callbacks.
#[derive(Debug)]
pub struct Progress {
    role: Role,
    expected: usize,
    captured: AtomicUsize,
    processed: AtomicU64,
    complete: AtomicBool,
}

/// Point-in-time copy of [`Progress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub role: Role,
    pub expected: usize,
    pub captured: usize,
    pub processed: u64,
    pub complete: bool,
}

impl Progress {
    pub fn new(role: Role, expected: usize) -> Self {
        Self {
            role,
            expected,
            captured: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            complete: AtomicBool::new(false),
        }
    }

    pub fn set_captured(&self, captured: usize) {
        self.captured.store(captured, Ordering::Relaxed);
    }

    pub fn set_processed(&self, processed: u64) {
        self.processed.store(processed, Ordering::Relaxed);
    }

    pub fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            role: self.role,
            expected: self.expected,
            captured: self.captured.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            complete: self.complete.load(Ordering::Acquire),
        }
    }
}

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub progress: Arc<Progress>,
    pub started_at: Instant,
}

/// Create the diagnostics router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/debug/progress", get(progress_handler))
        .route("/debug/pprof/flamegraph", get(flamegraph_handler))
        .with_state(Arc::new(state))
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "pid": std::process::id(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn progress_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(state.progress.snapshot())
}

#[derive(Debug, Deserialize)]
struct ProfileParams {
    seconds: Option<u64>,
}

/// Handler for `/debug/pprof/flamegraph` - profile the process and return SVG.
async fn flamegraph_handler(Query(params): Query<ProfileParams>) -> Response {
    let seconds = params.seconds.unwrap_or(DEFAULT_PROFILE_SECS);
    if !(1..=MAX_PROFILE_SECS).contains(&seconds) {
        return (
            StatusCode::BAD_REQUEST,
            format!("seconds must be between 1 and {MAX_PROFILE_SECS}"),
        )
            .into_response();
    }

    info!(seconds, "capturing flamegraph");
    let capture =
        tokio::task::spawn_blocking(move || capture_flamegraph(Duration::from_secs(seconds))).await;
    match capture {
        Ok(Ok(svg)) => ([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("profiling task failed: {e}"),
        )
            .into_response(),
    }
}

/// Bind `addr` and serve the diagnostics router in the background.
///
/// Binding happens before returning so an unusable address fails startup.
pub async fn start_server(
    addr: SocketAddr,
    state: HttpState,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    info!(addr = %local, "diagnostics listener started");

    let router = create_router(state);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            warn!(error = %e, "diagnostics listener stopped");
        }
    });
    Ok((local, task))
}
