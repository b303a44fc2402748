use serde::{Deserialize, Serialize};

use super::{Domain, Entity, EntityId, GeoPoint};

/// A public office (town hall desk, recycling center, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Office {
    pub id: EntityId,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    #[serde(rename = "openingHours")]
    pub opening_hours: Option<String>,
    pub location: Option<GeoPoint>,
}

impl Office {
    /// Distance from `point` in meters, if the office has a position.
    pub fn distance_from(&self, point: &GeoPoint) -> Option<f64> {
        self.location.map(|loc| loc.distance_meters(point))
    }
}

impl Entity for Office {
    const DOMAIN: Domain = Domain::Office;

    fn id(&self) -> EntityId {
        self.id
    }
}
