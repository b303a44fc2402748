//! REST access to the community-services backend.
//!
//! `RemoteDataSource` is the seam the refresh pipeline fetches through;
//! `ApiClient` is its HTTP implementation. Listing calls for the signed-in
//! user's own records need a bearer token obtained from the session.

pub mod client;
pub mod error;

use async_trait::async_trait;

use crate::models::{Entity, EntityId};

pub use client::ApiClient;
pub use error::RemoteError;

/// Remote listings and lookups for one entity type.
#[async_trait]
pub trait RemoteDataSource<E: Entity>: Send + Sync {
    /// Public/community listing, optionally restricted to a bounding box.
    async fn list_community(&self, bbox: Option<&str>) -> Result<Vec<E>, RemoteError>;

    /// Records owned by the authenticated user. Never spatially filtered.
    async fn list_user_owned(&self) -> Result<Vec<E>, RemoteError>;

    async fn get_by_id(&self, id: EntityId) -> Result<E, RemoteError>;
}
