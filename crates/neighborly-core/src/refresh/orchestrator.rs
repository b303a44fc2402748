use tracing::{debug, error};

use crate::api::{RemoteDataSource, RemoteError};
use crate::models::{Entity, UserId};
use crate::sync::SyncDecision;

/// Raw result of the fetch stage: community records followed by the user's
/// own records, not yet deduplicated.
#[derive(Debug, Clone)]
pub struct Aggregation<E> {
    pub entities: Vec<E>,
    pub user_id: Option<UserId>,
}

/// Fetch the community listing and, for a signed-in user, their own records.
///
/// Both requests run concurrently. Either failing fails the whole stage:
/// the merge step needs both sets complete when present.
pub async fn fetch_all<E: Entity>(
    remote: &dyn RemoteDataSource<E>,
    decision: &SyncDecision,
    user_id: Option<UserId>,
) -> Result<Aggregation<E>, RemoteError> {
    let community = remote.list_community(decision.bbox.as_deref());

    let (community, own) = match user_id {
        Some(_) => {
            let (community, own) = tokio::try_join!(community, remote.list_user_owned())
                .inspect_err(|e| error!(domain = %E::DOMAIN, error = %e, "Listing fetch failed"))?;
            (community, own)
        }
        None => {
            let community = community.await.inspect_err(|e| {
                error!(domain = %E::DOMAIN, error = %e, "Community fetch failed")
            })?;
            (community, Vec::new())
        }
    };

    debug!(
        domain = %E::DOMAIN,
        community = community.len(),
        own = own.len(),
        "Listings fetched"
    );

    let mut entities = community;
    entities.extend(own);
    Ok(Aggregation { entities, user_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticket;
    use crate::testing::{ticket, FakeRemote};

    fn decision(bbox: Option<&str>) -> SyncDecision {
        SyncDecision {
            should_fetch: true,
            bbox: bbox.map(String::from),
            current_location: None,
        }
    }

    fn ids(entities: &[Ticket]) -> Vec<i64> {
        entities.iter().map(|t| t.id).collect()
    }

    #[tokio::test]
    async fn test_concatenates_community_then_user() {
        let remote = FakeRemote::new();
        remote.set_community(Some(vec![ticket(1), ticket(2)]));
        remote.set_user(Some(vec![ticket(2), ticket(3)]));

        let result = fetch_all::<Ticket>(&remote, &decision(Some("1,2,3,4")), Some(7))
            .await
            .unwrap();
        assert_eq!(ids(&result.entities), vec![1, 2, 2, 3]);
        assert_eq!(result.user_id, Some(7));
        assert!(remote.calls().contains(&"community:1,2,3,4".to_string()));
    }

    #[tokio::test]
    async fn test_skips_user_listing_when_signed_out() {
        let remote = FakeRemote::new();
        remote.set_community(Some(vec![ticket(1)]));
        remote.set_user(None);

        let result = fetch_all::<Ticket>(&remote, &decision(None), None).await.unwrap();
        assert_eq!(ids(&result.entities), vec![1]);
        assert_eq!(remote.calls(), vec!["community:-".to_string()]);
    }

    #[tokio::test]
    async fn test_either_failure_fails_the_stage() {
        let remote = FakeRemote::<Ticket>::new();
        remote.set_community(Some(vec![ticket(1)]));
        remote.set_user(None);
        assert!(fetch_all::<Ticket>(&remote, &decision(None), Some(1)).await.is_err());

        remote.set_community(None);
        remote.set_user(Some(vec![ticket(2)]));
        assert!(fetch_all::<Ticket>(&remote, &decision(None), Some(1)).await.is_err());
    }
}
