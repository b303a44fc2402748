use std::collections::HashMap;

use crate::models::{Entity, EntityId};

/// Deduplicate by id. A later record replaces an earlier one with the same
/// id but keeps the earlier record's position.
pub fn reconcile<E: Entity>(all_fetched: Vec<E>) -> Vec<E> {
    let mut positions: HashMap<EntityId, usize> = HashMap::with_capacity(all_fetched.len());
    let mut merged: Vec<E> = Vec::with_capacity(all_fetched.len());

    for entity in all_fetched {
        match positions.get(&entity.id()) {
            Some(&index) => merged[index] = entity,
            None => {
                positions.insert(entity.id(), merged.len());
                merged.push(entity);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ticket;

    #[test]
    fn test_one_record_per_id() {
        let merged = reconcile(vec![ticket(1), ticket(2), ticket(2), ticket(3), ticket(1)]);
        let ids: Vec<_> = merged.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_later_record_wins() {
        let mut newer = ticket(2);
        newer.title = "from backfill".to_string();
        let merged = reconcile(vec![ticket(1), ticket(2), newer]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[1].title, "from backfill");
    }

    #[test]
    fn test_empty_input() {
        assert!(reconcile::<crate::models::Ticket>(Vec::new()).is_empty());
    }
}
