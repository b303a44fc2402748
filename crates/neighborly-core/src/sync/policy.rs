use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{BoundingBox, Domain, GeoPoint};
use crate::providers::{Clock, LocationProvider};

use super::state::{SyncState, SyncStateStore};

// ============================================================================
// Constants
// ============================================================================

/// Cached listings older than this are refetched.
/// Community data changes slowly; 5 minutes keeps pull-to-refresh meaningful.
const DEFAULT_STALE_AFTER_MINUTES: i64 = 5;

/// Moving further than this from the last fetch position triggers a refetch.
const DEFAULT_DISTANCE_THRESHOLD_M: f64 = 500.0;

/// Radius of the server-side search window around the device.
const DEFAULT_SEARCH_RADIUS_M: f64 = 5_000.0;

/// Thresholds used by the staleness policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
    pub stale_after_minutes: i64,
    pub distance_threshold_m: f64,
    pub search_radius_m: f64,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            stale_after_minutes: DEFAULT_STALE_AFTER_MINUTES,
            distance_threshold_m: DEFAULT_DISTANCE_THRESHOLD_M,
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
        }
    }
}

impl SyncPolicy {
    pub fn stale_after(&self) -> Duration {
        Duration::minutes(self.stale_after_minutes)
    }
}

/// Outcome of a staleness check, consumed once by the fetch stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncDecision {
    pub should_fetch: bool,
    /// Server-side spatial filter; `None` for non-spatial domains or unknown position.
    pub bbox: Option<String>,
    pub current_location: Option<GeoPoint>,
}

/// Staleness policy engine shared by all domain repositories.
pub struct SyncManager {
    clock: Arc<dyn Clock>,
    location: Arc<dyn LocationProvider>,
    policy: SyncPolicy,
    states: Mutex<SyncStateStore>,
}

impl SyncManager {
    pub fn new(
        clock: Arc<dyn Clock>,
        location: Arc<dyn LocationProvider>,
        policy: SyncPolicy,
        states: SyncStateStore,
    ) -> Self {
        Self {
            clock,
            location,
            policy,
            states: Mutex::new(states),
        }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    fn states(&self) -> MutexGuard<'_, SyncStateStore> {
        // Sync state is advisory; a poisoned lock still holds usable data.
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Decide whether `domain` must be refetched now.
    pub fn decide(&self, domain: Domain, force: bool) -> SyncDecision {
        let current_location = if domain.is_location_sensitive() {
            self.location.current()
        } else {
            None
        };
        let bbox = current_location
            .map(|p| BoundingBox::around(p, self.policy.search_radius_m).to_query_string());

        let should_fetch = force || self.is_stale(domain, current_location);
        debug!(domain = %domain, force, should_fetch, bbox = ?bbox, "Sync decision");

        SyncDecision {
            should_fetch,
            bbox,
            current_location,
        }
    }

    fn is_stale(&self, domain: Domain, current_location: Option<GeoPoint>) -> bool {
        let state = match self.states().get(domain.feature_key()) {
            Some(state) => state.clone(),
            None => return true,
        };
        let Some(last_fetch_at) = state.last_fetch_at else {
            return true;
        };

        if self.clock.now() - last_fetch_at >= self.policy.stale_after() {
            return true;
        }

        match (current_location, state.last_location) {
            (Some(current), Some(last)) => {
                current.distance_meters(&last) >= self.policy.distance_threshold_m
            }
            // Fetched without a position, now we have one: the window changed.
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Mark `domain` as freshly fetched at `location`. Call only after the
    /// whole refresh pipeline committed.
    pub fn record_success(&self, domain: Domain, location: Option<GeoPoint>) {
        let state = SyncState {
            last_fetch_at: Some(self.clock.now()),
            last_location: location,
        };
        self.states().put(domain.feature_key(), state);
    }

    /// Forget the last fetch so the next decision is stale.
    pub fn invalidate(&self, domain: Domain) {
        info!(domain = %domain, "Sync state invalidated");
        self.states().remove(domain.feature_key());
    }

    pub fn state(&self, domain: Domain) -> SyncState {
        self.states()
            .get(domain.feature_key())
            .cloned()
            .unwrap_or_default()
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}
