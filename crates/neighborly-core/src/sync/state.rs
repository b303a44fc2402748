//! Persisted per-feature sync state.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::GeoPoint;

/// Sync state file name in cache directory
const SYNC_STATE_FILE: &str = "sync_state.json";

/// What the last successful refresh of a feature looked like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_location: Option<GeoPoint>,
}

impl SyncState {
    pub fn age_minutes(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_fetch_at.map(|at| (now - at).num_minutes())
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let Some(minutes) = self.age_minutes(now) else {
            return "never".to_string();
        };
        if minutes < 1 {
            // Negative ages come from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// `feature key -> SyncState`, optionally backed by a JSON file.
pub struct SyncStateStore {
    path: Option<PathBuf>,
    states: HashMap<String, SyncState>,
}

impl SyncStateStore {
    /// Load state from `cache_dir`. An unreadable file starts empty, which
    /// makes every feature stale.
    pub fn open(cache_dir: PathBuf) -> Self {
        let path = cache_dir.join(SYNC_STATE_FILE);
        let states = match Self::read(&path) {
            Ok(states) => states,
            Err(e) => {
                warn!(error = %e, "Failed to load sync state, treating all data as stale");
                HashMap::new()
            }
        };
        debug!(features = states.len(), "Sync state loaded");
        Self {
            path: Some(path),
            states,
        }
    }

    /// State that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            states: HashMap::new(),
        }
    }

    fn read(path: &PathBuf) -> Result<HashMap<String, SyncState>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sync state: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sync state: {}", path.display()))
    }

    pub fn get(&self, key: &str) -> Option<&SyncState> {
        self.states.get(key)
    }

    /// Overwrite the state for `key`. The in-memory value always changes; a
    /// failed disk write is logged and otherwise ignored.
    pub fn put(&mut self, key: &str, state: SyncState) {
        self.states.insert(key.to_string(), state);
        if let Err(e) = self.save() {
            warn!(feature = key, error = %e, "Failed to persist sync state");
        }
    }

    pub fn remove(&mut self, key: &str) {
        if self.states.remove(key).is_some() {
            if let Err(e) = self.save() {
                warn!(feature = key, error = %e, "Failed to persist sync state");
            }
        }
    }

    fn save(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // A crash mid-write must never leave a truncated file in place.
        let tmp = path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(&self.states)?;
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
