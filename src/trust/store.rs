//! Persistence for trust scores.
//!
//! The ledger only needs a key-value contract: load everything at
//! startup, overwrite everything on each update. `JsonFileStore` writes a
//! temp file, fsyncs it and renames it over the target so a crash leaves
//! either the previous or the new snapshot, never a torn one.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::TrustError;

/// Default trust file path.
pub const DEFAULT_TRUST_FILE: &str = "trust_scores.json";

/// Durable key-value record of source scores.
pub trait TrustStore: Send + Sync {
    /// Read the full map. A missing record is an empty map, not an error.
    fn load(&self) -> Result<HashMap<String, f64>, TrustError>;

    /// Replace the full map. Must be durable when it returns `Ok`.
    fn save(&self, scores: &HashMap<String, f64>) -> Result<(), TrustError>;
}

impl<T: TrustStore + ?Sized> TrustStore for Arc<T> {
    fn load(&self) -> Result<HashMap<String, f64>, TrustError> {
        (**self).load()
    }

    fn save(&self, scores: &HashMap<String, f64>) -> Result<(), TrustError> {
        (**self).save(scores)
    }
}

// ---------------------------------------------------------------------------
// JSON file
// ---------------------------------------------------------------------------

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_TRUST_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TrustStore for JsonFileStore {
    fn load(&self) -> Result<HashMap<String, f64>, TrustError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No trust file found, starting from seeds");
            return Ok(HashMap::new());
        }
        let json = fs::read_to_string(&self.path).map_err(|e| TrustError::io(&self.path, e))?;
        let scores: HashMap<String, f64> =
            serde_json::from_str(&json).map_err(|e| TrustError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;
        info!(path = %self.path.display(), sources = scores.len(), "Trust scores loaded");
        Ok(scores)
    }

    fn save(&self, scores: &HashMap<String, f64>) -> Result<(), TrustError> {
        let json = serde_json::to_string_pretty(scores).map_err(|e| TrustError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| TrustError::io(&tmp, e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| TrustError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| TrustError::io(&self.path, e))?;

        debug!(path = %self.path.display(), sources = scores.len(), "Trust scores saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Volatile store, counts writes. Used by tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    scores: Mutex<HashMap<String, f64>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn with_scores(scores: HashMap<String, f64>) -> Self {
        Self {
            scores: Mutex::new(scores),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.scores.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl TrustStore for MemoryStore {
    fn load(&self) -> Result<HashMap<String, f64>, TrustError> {
        Ok(self.snapshot())
    }

    fn save(&self, scores: &HashMap<String, f64>) -> Result<(), TrustError> {
        let mut guard = self
            .scores
            .lock()
            .map_err(|_| TrustError::Unavailable("memory store poisoned".into()))?;
        *guard = scores.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
