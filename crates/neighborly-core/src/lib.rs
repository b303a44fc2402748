//! Neighborly core - offline-first cache and sync for community services.
//!
//! Citizen reports (`Ticket`), public offices (`Office`) and notices (`Info`)
//! are fetched from a REST backend and kept in a local cache that readers
//! query without waiting on the network. Each domain decides on its own when
//! to refetch (age of the cache, distance moved), merges the community
//! listing with the user's own records, backfills favorites the listings
//! missed, and replaces its cache atomically.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod models;
pub mod providers;
pub mod refresh;
pub mod repository;
pub mod store;
pub mod sync;

#[cfg(test)]
mod testing;

pub use app::Neighborly;
pub use config::Config;
pub use repository::{RefreshOutcome, RefreshPhase, Repository, RepositoryError};
