use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Domain, Entity, EntityId};

/// An informational notice published by the municipality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub id: EntityId,
    pub title: String,
    pub body: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "publishedAt")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(rename = "validUntil")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl Info {
    /// A notice without an expiry stays active forever.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let published = self.published_at.map_or(true, |p| p <= now);
        let not_expired = self.valid_until.map_or(true, |v| v >= now);
        published && not_expired
    }
}

impl Entity for Info {
    const DOMAIN: Domain = Domain::Info;

    fn id(&self) -> EntityId {
        self.id
    }
}
