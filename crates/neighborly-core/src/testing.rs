//! Fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Notify;

use crate::api::{RemoteDataSource, RemoteError};
use crate::models::{Entity, EntityId, GeoPoint, Info, Office, Ticket, TicketStatus, UserId};
use crate::providers::{Clock, CurrentUserProvider, LocationProvider};

pub fn ticket(id: EntityId) -> Ticket {
    Ticket {
        id,
        title: format!("ticket {}", id),
        description: None,
        status: TicketStatus::Open,
        category: None,
        address: None,
        location: None,
        owner_id: None,
        image_urls: Vec::new(),
        created_at: None,
        updated_at: None,
    }
}

pub fn office(id: EntityId) -> Office {
    Office {
        id,
        name: format!("office {}", id),
        address: None,
        phone: None,
        email: None,
        website: None,
        opening_hours: None,
        location: None,
    }
}

pub fn info(id: EntityId) -> Info {
    Info {
        id,
        title: format!("info {}", id),
        body: None,
        category: None,
        published_at: None,
        valid_until: None,
    }
}

/// A clock that only moves when told to.
pub struct TestClock(Mutex<DateTime<Utc>>);

impl TestClock {
    pub fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

pub struct MovableLocation(Mutex<Option<GeoPoint>>);

impl MovableLocation {
    pub fn at(point: GeoPoint) -> Self {
        Self(Mutex::new(Some(point)))
    }

    pub fn set(&self, point: Option<GeoPoint>) {
        *self.0.lock().unwrap() = point;
    }
}

impl LocationProvider for MovableLocation {
    fn current(&self) -> Option<GeoPoint> {
        *self.0.lock().unwrap()
    }
}

pub struct StaticUser(pub Option<UserId>);

impl CurrentUserProvider for StaticUser {
    fn current_user_id(&self) -> Option<UserId> {
        self.0
    }
}

/// Scripted remote. A `None` listing fails with a server error; lookups
/// missing from `by_id` fail with not-found.
pub struct FakeRemote<E> {
    community: Mutex<Option<Vec<E>>>,
    user: Mutex<Option<Vec<E>>>,
    by_id: Mutex<HashMap<EntityId, E>>,
    calls: Mutex<Vec<String>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl<E: Entity> FakeRemote<E> {
    pub fn new() -> Self {
        Self {
            community: Mutex::new(Some(Vec::new())),
            user: Mutex::new(Some(Vec::new())),
            by_id: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    pub fn set_community(&self, items: Option<Vec<E>>) {
        *self.community.lock().unwrap() = items;
    }

    pub fn set_user(&self, items: Option<Vec<E>>) {
        *self.user.lock().unwrap() = items;
    }

    pub fn add_lookup(&self, item: E) {
        self.by_id.lock().unwrap().insert(item.id(), item);
    }

    /// The next community listing blocks until the returned handle is notified.
    pub fn hold_next_community(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl<E: Entity> RemoteDataSource<E> for FakeRemote<E> {
    async fn list_community(&self, bbox: Option<&str>) -> Result<Vec<E>, RemoteError> {
        self.record(format!("community:{}", bbox.unwrap_or("-")));
        let hold = self.hold.lock().unwrap().take();
        if let Some(notify) = hold {
            notify.notified().await;
        }
        let items = self.community.lock().unwrap().clone();
        items.ok_or_else(|| RemoteError::ServerError("community listing failed".to_string()))
    }

    async fn list_user_owned(&self) -> Result<Vec<E>, RemoteError> {
        self.record("user".to_string());
        let items = self.user.lock().unwrap().clone();
        items.ok_or_else(|| RemoteError::ServerError("user listing failed".to_string()))
    }

    async fn get_by_id(&self, id: EntityId) -> Result<E, RemoteError> {
        self.record(format!("get:{}", id));
        let item = self.by_id.lock().unwrap().get(&id).cloned();
        item.ok_or_else(|| RemoteError::NotFound(format!("{}", id)))
    }
}
