//! The refresh pipeline stages: fetch, favorite backfill, reconciliation.
//!
//! Each stage is a free function so the domain repositories can compose
//! them (and tests can drive them) without a shared object graph.

mod backfill;
mod orchestrator;
mod reconcile;

pub use backfill::{resolve_missing_favorites, DEFAULT_BACKFILL_CONCURRENCY};
pub use orchestrator::{fetch_all, Aggregation};
pub use reconcile::reconcile;
