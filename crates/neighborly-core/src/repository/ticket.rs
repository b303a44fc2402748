use crate::models::{EntityId, Favorited, Ticket};
use crate::store::LocalStore;

use super::{Repository, RepositoryError};

pub type TicketRepository<S> = Repository<Ticket, S>;

impl<S: LocalStore> Repository<Ticket, S> {
    /// Cached tickets reported by the signed-in user.
    pub fn owned_by_current_user(&self) -> Result<Vec<Favorited<Ticket>>, RepositoryError> {
        let Some(user_id) = self.current_user_id() else {
            return Ok(Vec::new());
        };
        Ok(self
            .entities()?
            .into_iter()
            .filter(|t| t.entity.owner_id == Some(user_id))
            .collect())
    }

    pub fn open_tickets(&self) -> Result<Vec<Favorited<Ticket>>, RepositoryError> {
        Ok(self
            .entities()?
            .into_iter()
            .filter(|t| t.entity.is_open())
            .collect())
    }

    /// Keep a locally composed ticket. Drafts survive every refresh.
    pub fn save_draft(&self, draft: &Ticket) -> Result<(), RepositoryError> {
        self.store().save_draft(draft)?;
        Ok(())
    }

    pub fn drafts(&self) -> Result<Vec<Ticket>, RepositoryError> {
        Ok(self.store().drafts::<Ticket>()?)
    }

    pub fn discard_draft(&self, id: EntityId) -> Result<bool, RepositoryError> {
        Ok(self.store().delete_draft::<Ticket>(id)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::RemoteDataSource;
    use crate::models::TicketStatus;
    use crate::providers::NoLocation;
    use crate::store::MemoryStore;
    use crate::sync::{SyncManager, SyncPolicy, SyncStateStore};
    use crate::testing::{ticket, FakeRemote, StaticUser, TestClock};

    fn repo(remote: Arc<FakeRemote<Ticket>>, user: Option<i64>) -> TicketRepository<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let sync = Arc::new(SyncManager::new(
            Arc::new(TestClock::new()),
            Arc::new(NoLocation),
            SyncPolicy::default(),
            SyncStateStore::in_memory(),
        ));
        let source: Arc<dyn RemoteDataSource<Ticket>> = remote;
        Repository::new(source, store.clone(), store, Arc::new(StaticUser(user)), sync)
    }

    #[tokio::test]
    async fn test_owned_by_current_user() {
        let remote = Arc::new(FakeRemote::new());
        let mut mine = ticket(2);
        mine.owner_id = Some(7);
        remote.set_community(Some(vec![ticket(1), mine.clone()]));
        remote.set_user(Some(vec![mine]));

        let repo = repo(remote, Some(7));
        repo.refresh(false).await.unwrap();

        let owned = repo.owned_by_current_user().unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].entity.id, 2);
    }

    #[tokio::test]
    async fn test_open_tickets_filters_closed() {
        let remote = Arc::new(FakeRemote::new());
        let mut closed = ticket(2);
        closed.status = TicketStatus::Closed;
        remote.set_community(Some(vec![ticket(1), closed]));

        let repo = repo(remote, None);
        repo.refresh(false).await.unwrap();
        let open: Vec<_> = repo.open_tickets().unwrap().into_iter().map(|t| t.entity.id).collect();
        assert_eq!(open, vec![1]);
    }

    #[test]
    fn test_draft_lifecycle() {
        let repo = repo(Arc::new(FakeRemote::new()), None);
        repo.save_draft(&ticket(-1)).unwrap();
        assert_eq!(repo.drafts().unwrap().len(), 1);

        assert!(repo.discard_draft(-1).unwrap());
        assert!(!repo.discard_draft(-1).unwrap());
        assert!(repo.drafts().unwrap().is_empty());
    }
}
