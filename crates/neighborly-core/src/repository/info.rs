use chrono::{DateTime, Utc};

use crate::models::{Favorited, Info};
use crate::store::LocalStore;

use super::{Repository, RepositoryError};

pub type InfoRepository<S> = Repository<Info, S>;

impl<S: LocalStore> Repository<Info, S> {
    /// Notices active right now according to the sync clock.
    pub fn active(&self) -> Result<Vec<Favorited<Info>>, RepositoryError> {
        self.active_at(self.now())
    }

    /// Cached notices that are published and not yet expired at `now`,
    /// newest first.
    pub fn active_at(&self, now: DateTime<Utc>) -> Result<Vec<Favorited<Info>>, RepositoryError> {
        let mut active: Vec<_> = self
            .entities()?
            .into_iter()
            .filter(|info| info.entity.is_active_at(now))
            .collect();
        active.sort_by(|a, b| b.entity.published_at.cmp(&a.entity.published_at));
        Ok(active)
    }
}
