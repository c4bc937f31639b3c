//! Liveness and status route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<HealthState>`.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::orchestrator::IterationReport;
use crate::trust::TrustLedger;

/// Iterations kept for `/api/iterations`.
const ITERATION_HISTORY: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Facts fixed at startup.
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub engine: String,
    pub version: String,
    pub mode: String,
    pub keys_detected: bool,
    pub telegram_active: bool,
    pub networks: Vec<String>,
}

/// Running totals across all iterations.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Counters {
    pub iterations: u64,
    pub strikes: u64,
    pub succeeded: u64,
    pub reverted: u64,
    pub underfunded: u64,
    pub failed: u64,
    pub distrusted: u64,
    pub aborted: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IterationLogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub report: IterationReport,
}

/// Shared state accessible by all route handlers.
pub struct HealthState {
    pub info: EngineInfo,
    pub started_at: DateTime<Utc>,
    pub counters: RwLock<Counters>,
    pub iterations: RwLock<Vec<IterationLogEntry>>,
    trust: Option<Arc<TrustLedger>>,
}

impl HealthState {
    pub fn new(info: EngineInfo) -> Self {
        Self {
            info,
            started_at: Utc::now(),
            counters: RwLock::new(Counters::default()),
            iterations: RwLock::new(Vec::new()),
            trust: None,
        }
    }

    /// Expose trust scores on `/api/trust`.
    pub fn with_trust(mut self, trust: Arc<TrustLedger>) -> Self {
        self.trust = Some(trust);
        self
    }

    /// Fold one iteration into the running totals.
    pub async fn record(&self, report: &IterationReport) {
        {
            let mut c = self.counters.write().await;
            c.iterations += 1;
            c.strikes += report.dispatched as u64;
            c.succeeded += report.succeeded as u64;
            c.reverted += report.reverted as u64;
            c.underfunded += report.underfunded as u64;
            c.failed += report.failed as u64;
            c.distrusted += report.distrusted as u64;
            c.aborted += report.aborted as u64;
        }
        let mut log = self.iterations.write().await;
        log.push(IterationLogEntry {
            timestamp: Utc::now().to_rfc3339(),
            report: report.clone(),
        });
        if log.len() > ITERATION_HISTORY {
            let excess = log.len() - ITERATION_HISTORY;
            log.drain(..excess);
        }
    }
}

pub type AppState = Arc<HealthState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub engine: String,
    pub uptime_secs: i64,
    #[serde(flatten)]
    pub counters: Counters,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health and GET /
pub async fn health(State(state): State<AppState>) -> Json<EngineInfo> {
    Json(state.info.clone())
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let counters = state.counters.read().await.clone();
    Json(StatusResponse {
        engine: state.info.engine.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        counters,
    })
}

/// GET /api/iterations
pub async fn get_iterations(State(state): State<AppState>) -> Json<Vec<IterationLogEntry>> {
    Json(state.iterations.read().await.clone())
}

/// GET /api/trust
pub async fn get_trust(State(state): State<AppState>) -> Json<BTreeMap<String, f64>> {
    let scores = match &state.trust {
        Some(ledger) => ledger.snapshot().await.into_iter().collect(),
        None => BTreeMap::new(),
    };
    Json(scores)
}
