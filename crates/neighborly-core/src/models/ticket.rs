use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Domain, Entity, EntityId, GeoPoint, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Open => write!(f, "Open"),
            TicketStatus::InProgress => write!(f, "In Progress"),
            TicketStatus::Resolved => write!(f, "Resolved"),
            TicketStatus::Closed => write!(f, "Closed"),
        }
    }
}

/// A citizen report (damaged street light, overflowing bin, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: EntityId,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: TicketStatus,
    pub category: Option<String>,
    pub address: Option<String>,
    pub location: Option<GeoPoint>,
    #[serde(rename = "ownerId")]
    pub owner_id: Option<UserId>,
    #[serde(rename = "imageUrls", default)]
    pub image_urls: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_open(&self) -> bool {
        matches!(self.status, TicketStatus::Open | TicketStatus::InProgress)
    }
}

impl Entity for Ticket {
    const DOMAIN: Domain = Domain::Ticket;

    fn id(&self) -> EntityId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_deserializes_wire_names() {
        let json = r#"{
            "id": 42,
            "title": "Broken street light",
            "description": null,
            "status": "IN_PROGRESS",
            "category": "lighting",
            "address": "Main St 1",
            "location": {"latitude": 48.1, "longitude": 11.5},
            "ownerId": 7,
            "createdAt": "2026-01-02T10:00:00Z",
            "updatedAt": null
        }"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.id, 42);
        assert_eq!(ticket.owner_id, Some(7));
        assert_eq!(ticket.status, TicketStatus::InProgress);
        assert!(ticket.image_urls.is_empty());
        assert!(ticket.is_open());
    }
}
