//! Data models for community-service entities.
//!
//! This module contains the records cached locally and the small value
//! types the sync core passes around:
//!
//! - `Ticket`, `Office`, `Info`: the three cached domains
//! - `GeoPoint`, `BoundingBox`: device position and server-side spatial filter
//! - `FavoriteMarker`, `Favorited`: favorites and the read-through overlay

pub mod favorite;
pub mod geo;
pub mod info;
pub mod office;
pub mod ticket;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use favorite::{FavoriteMarker, Favorited};
pub use geo::{BoundingBox, GeoPoint};
pub use info::Info;
pub use office::Office;
pub use ticket::{Ticket, TicketStatus};

/// Stable server-assigned identifier, unique within a domain.
pub type EntityId = i64;

/// Identifier of an authenticated user.
pub type UserId = i64;

/// A cache domain. Each domain has its own cache partition and sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Ticket,
    Office,
    Info,
}

impl Domain {
    pub const ALL: [Domain; 3] = [Domain::Ticket, Domain::Office, Domain::Info];

    /// Key used to partition sync state and local cache contents.
    pub fn feature_key(&self) -> &'static str {
        match self {
            Domain::Ticket => "ticket",
            Domain::Office => "office",
            Domain::Info => "info",
        }
    }

    /// REST collection path for this domain.
    pub fn resource(&self) -> &'static str {
        match self {
            Domain::Ticket => "tickets",
            Domain::Office => "offices",
            Domain::Info => "infos",
        }
    }

    /// Whether listings are filtered by the device's surroundings, making
    /// distance moved a reason to refetch.
    pub fn is_location_sensitive(&self) -> bool {
        matches!(self, Domain::Ticket | Domain::Office)
    }

    /// Parse a feature key or resource name ("ticket" / "tickets").
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.trim().to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| lower == d.feature_key() || lower == d.resource())
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.feature_key())
    }
}

/// A record that can live in the local cache.
///
/// Identity is by `id` only: two records with the same id are the same
/// entity, whatever their other fields say.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Domain this record type belongs to.
    const DOMAIN: Domain;

    fn id(&self) -> EntityId;
}
