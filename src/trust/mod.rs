//! Trust ledger: per-source reliability learned from confirmed outcomes.
//!
//! Scores live in [0.1, 0.99]. A confirmed success multiplies by 1.05,
//! a failure by 0.90; unseen sources read as 0.5. Every update is written
//! through to the store before `update` returns, and all updates go
//! through one async mutex so concurrent adjustments never lose a step.

pub mod store;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub use store::{JsonFileStore, MemoryStore, TrustStore};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const DEFAULT_SCORE: f64 = 0.5;
pub const MIN_SCORE: f64 = 0.1;
pub const MAX_SCORE: f64 = 0.99;
pub const SUCCESS_FACTOR: f64 = 1.05;
pub const FAILURE_FACTOR: f64 = 0.90;

/// Threshold used by the trust gate when enabled without an explicit value.
pub const DEFAULT_GATE_THRESHOLD: f64 = 0.4;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("trust store I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("trust store at {path} is not valid JSON: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("trust store unavailable: {0}")]
    Unavailable(String),
}

impl TrustError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TrustError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Whether low-trust sources are excluded before dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrustPolicy {
    /// Every signal is dispatched regardless of its source's score.
    Disabled,
    /// Signals from sources scoring below the threshold are dropped.
    MinScore(f64),
}

impl TrustPolicy {
    /// Whether a source at `score` is excluded.
    pub fn rejects(&self, score: f64) -> bool {
        match self {
            TrustPolicy::Disabled => false,
            TrustPolicy::MinScore(min) => score < *min,
        }
    }
}

/// Apply one outcome to a score.
pub fn adjust(previous: f64, success: bool) -> f64 {
    if success {
        (previous * SUCCESS_FACTOR).min(MAX_SCORE)
    } else {
        (previous * FAILURE_FACTOR).max(MIN_SCORE)
    }
}

fn clamp(score: f64) -> f64 {
    if score.is_nan() {
        DEFAULT_SCORE
    } else {
        score.clamp(MIN_SCORE, MAX_SCORE)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct TrustLedger {
    scores: Mutex<HashMap<String, f64>>,
    store: Arc<dyn TrustStore>,
}

impl TrustLedger {
    /// Load persisted scores, filling in `seeds` for sources never seen.
    ///
    /// An unreadable record is logged and replaced by the seeds; it is not
    /// rewritten until the first update.
    pub fn open(store: Box<dyn TrustStore>, seeds: &HashMap<String, f64>) -> Self {
        let persisted = store.load().unwrap_or_else(|e| {
            warn!(error = %e, "Trust store unreadable, falling back to seeds");
            HashMap::new()
        });

        let mut scores: HashMap<String, f64> = seeds
            .iter()
            .map(|(k, v)| (k.clone(), clamp(*v)))
            .collect();
        for (source, score) in persisted {
            scores.insert(source, clamp(score));
        }

        info!(sources = scores.len(), "Trust ledger ready");
        Self {
            scores: Mutex::new(scores),
            store: Arc::from(store),
        }
    }

    /// Current score, `DEFAULT_SCORE` if the source has no record.
    pub async fn get(&self, source_id: &str) -> f64 {
        self.scores
            .lock()
            .await
            .get(source_id)
            .copied()
            .unwrap_or(DEFAULT_SCORE)
    }

    /// Apply an outcome and persist before returning the new score.
    ///
    /// If the write fails the in-memory score is left unchanged, so memory
    /// and disk never disagree. The write runs on the blocking pool while
    /// the lock is held.
    pub async fn update(&self, source_id: &str, success: bool) -> Result<f64, TrustError> {
        let mut scores = self.scores.lock().await;
        let previous = scores.get(source_id).copied().unwrap_or(DEFAULT_SCORE);
        let next = adjust(previous, success);

        let mut staged = scores.clone();
        staged.insert(source_id.to_string(), next);
        let store = self.store.clone();
        *scores = tokio::task::spawn_blocking(move || store.save(&staged).map(|_| staged))
            .await
            .map_err(|e| TrustError::Unavailable(format!("trust write task failed: {e}")))??;

        info!(
            source = source_id,
            success,
            previous = format!("{previous:.4}"),
            score = format!("{next:.4}"),
            "Trust updated"
        );
        Ok(next)
    }

    /// Copy of every known score.
    pub async fn snapshot(&self) -> HashMap<String, f64> {
        self.scores.lock().await.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> TrustLedger {
        TrustLedger::open(Box::new(MemoryStore::default()), &HashMap::new())
    }

    /// A store whose writes always fail.
    struct BrokenStore;

    impl TrustStore for BrokenStore {
        fn load(&self) -> Result<HashMap<String, f64>, TrustError> {
            Ok(HashMap::new())
        }
        fn save(&self, _: &HashMap<String, f64>) -> Result<(), TrustError> {
            Err(TrustError::Unavailable("disk full".into()))
        }
    }

    #[test]
    fn test_adjust() {
        assert!((adjust(0.5, true) - 0.525).abs() < 1e-12);
        assert!((adjust(0.5, false) - 0.45).abs() < 1e-12);
        assert_eq!(adjust(0.98, true), MAX_SCORE);
        assert_eq!(adjust(0.105, false), MIN_SCORE);
    }

    #[test]
    fn test_policy() {
        assert!(!TrustPolicy::Disabled.rejects(0.0));
        assert!(TrustPolicy::MinScore(0.4).rejects(0.39));
        assert!(!TrustPolicy::MinScore(0.4).rejects(0.4));
    }

    #[tokio::test]
    async fn test_unseen_source_defaults() {
        assert_eq!(ledger().get("nobody").await, DEFAULT_SCORE);
    }

    #[tokio::test]
    async fn test_update_success_and_failure() {
        let l = ledger();
        let s = l.update("WEB_AI", true).await.unwrap();
        assert!((s - 0.525).abs() < 1e-12);
        let s = l.update("WEB_AI", false).await.unwrap();
        assert!((s - 0.4725).abs() < 1e-12);
        assert_eq!(l.get("WEB_AI").await, s);
    }

    #[tokio::test]
    async fn test_bounds_hold_over_many_updates() {
        let l = ledger();
        for _ in 0..200 {
            l.update("up", true).await.unwrap();
            l.update("down", false).await.unwrap();
        }
        assert_eq!(l.get("up").await, MAX_SCORE);
        assert_eq!(l.get("down").await, MIN_SCORE);
    }

    #[tokio::test]
    async fn test_write_through_every_update() {
        let store = Arc::new(MemoryStore::default());
        let l = TrustLedger::open(Box::new(store.clone()), &HashMap::new());
        l.update("A", true).await.unwrap();
        l.update("B", false).await.unwrap();
        assert_eq!(store.writes(), 2);
        let persisted = store.snapshot();
        assert!((persisted["A"] - 0.525).abs() < 1e-12);
        assert!((persisted["B"] - 0.45).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_score_unchanged() {
        let l = TrustLedger::open(Box::new(BrokenStore), &HashMap::new());
        assert!(l.update("A", true).await.is_err());
        assert_eq!(l.get("A").await, DEFAULT_SCORE);
    }

    /// Records which thread performed the write.
    #[derive(Default)]
    struct ThreadStore {
        writer: std::sync::Mutex<Option<std::thread::ThreadId>>,
    }

    impl TrustStore for ThreadStore {
        fn load(&self) -> Result<HashMap<String, f64>, TrustError> {
            Ok(HashMap::new())
        }
        fn save(&self, _: &HashMap<String, f64>) -> Result<(), TrustError> {
            *self.writer.lock().unwrap() = Some(std::thread::current().id());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_runs_off_the_runtime_thread() {
        let store = Arc::new(ThreadStore::default());
        let l = TrustLedger::open(Box::new(store.clone()), &HashMap::new());
        l.update("A", true).await.unwrap();

        let writer = store.writer.lock().unwrap().expect("store was written");
        assert_ne!(writer, std::thread::current().id());
    }

    #[tokio::test]
    async fn test_concurrent_updates_to_same_source_are_serialized() {
        let l = Arc::new(ledger());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let l = l.clone();
            handles.push(tokio::spawn(async move { l.update("S", false).await.unwrap() }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let expected = (0..20).fold(DEFAULT_SCORE, |s, _| adjust(s, false));
        assert!((l.get("S").await - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_seeds_and_persisted_values() {
        let persisted = HashMap::from([("FAT_PIG".to_string(), 0.42)]);
        let seeds = HashMap::from([
            ("FAT_PIG".to_string(), 0.95),
            ("WEB_AI".to_string(), 0.85),
            ("WILD".to_string(), 5.0),
        ]);
        let l = TrustLedger::open(Box::new(MemoryStore::with_scores(persisted)), &seeds);
        assert_eq!(l.get("FAT_PIG").await, 0.42);
        assert_eq!(l.get("WEB_AI").await, 0.85);
        assert_eq!(l.get("WILD").await, MAX_SCORE);
    }

    #[tokio::test]
    async fn test_restart_rereads_last_value() {
        let path = std::env::temp_dir().join(format!("sentinel_ledger_{}.json", uuid::Uuid::new_v4()));
        {
            let l = TrustLedger::open(Box::new(JsonFileStore::new(&path)), &HashMap::new());
            l.update("TG", false).await.unwrap();
        }
        let l = TrustLedger::open(Box::new(JsonFileStore::new(&path)), &HashMap::new());
        assert!((l.get("TG").await - 0.45).abs() < 1e-12);
        std::fs::remove_file(&path).unwrap();
    }
}
