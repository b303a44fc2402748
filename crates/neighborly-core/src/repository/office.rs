use std::cmp::Ordering;

use crate::models::{Favorited, GeoPoint, Office};
use crate::store::LocalStore;

use super::{Repository, RepositoryError};

pub type OfficeRepository<S> = Repository<Office, S>;

impl<S: LocalStore> Repository<Office, S> {
    /// Up to `limit` cached offices closest to `point`, nearest first.
    /// Offices without a position are left out.
    pub fn nearest(
        &self,
        point: GeoPoint,
        limit: usize,
    ) -> Result<Vec<(Favorited<Office>, f64)>, RepositoryError> {
        let mut with_distance: Vec<_> = self
            .entities()?
            .into_iter()
            .filter_map(|office| {
                let distance = office.entity.distance_from(&point)?;
                Some((office, distance))
            })
            .collect();
        with_distance.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
        with_distance.truncate(limit);
        Ok(with_distance)
    }
}
