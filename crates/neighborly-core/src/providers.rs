//! Capabilities the sync core consumes from its host.
//!
//! The host application supplies time, position and the signed-in user.
//! Keeping them behind traits lets the staleness policy and the refresh
//! pipeline run against fixed clocks and positions in tests.

use chrono::{DateTime, Utc};

use crate::models::{GeoPoint, UserId};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Current device position, if known.
pub trait LocationProvider: Send + Sync {
    fn current(&self) -> Option<GeoPoint>;
}

/// Used when the host has no positioning (or permission was denied).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocation;

impl LocationProvider for NoLocation {
    fn current(&self) -> Option<GeoPoint> {
        None
    }
}

/// A position set once by the host, e.g. from a command line flag.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub GeoPoint);

impl LocationProvider for FixedLocation {
    fn current(&self) -> Option<GeoPoint> {
        Some(self.0)
    }
}

pub trait CurrentUserProvider: Send + Sync {
    /// The authenticated user, or `None` when signed out.
    fn current_user_id(&self) -> Option<UserId>;
}

/// Bearer token for authenticated requests, read on every request so a
/// sign-in or sign-out takes effect without rebuilding the client.
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A token fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}
