//! Wires the sync core together for a host application.
//!
//! `Neighborly` owns one HTTP client, one SQLite cache, the session and a
//! shared `SyncManager`, and hands out one repository per domain.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::api::{ApiClient, RemoteDataSource};
use crate::auth::Session;
use crate::config::Config;
use crate::models::{Domain, Entity};
use crate::providers::{LocationProvider, SystemClock};
use crate::repository::{
    InfoRepository, OfficeRepository, RefreshOutcome, Repository, RepositoryError,
    TicketRepository,
};
use crate::store::SqliteStore;
use crate::sync::{SyncManager, SyncStateStore};

/// SQLite cache file name inside the cache directory
const CACHE_DB_FILE: &str = "cache.db";

pub struct Neighborly {
    pub session: Arc<Session>,
    pub tickets: TicketRepository<SqliteStore>,
    pub offices: OfficeRepository<SqliteStore>,
    pub infos: InfoRepository<SqliteStore>,
    sync: Arc<SyncManager>,
    cache_dir: PathBuf,
}

impl Neighborly {
    /// Open the cache in the configured cache directory.
    pub fn open(config: &Config, location: Arc<dyn LocationProvider>) -> Result<Self> {
        let cache_dir = config.cache_dir().unwrap_or_else(|e| {
            warn!(error = %e, "No user cache directory, using ./cache");
            PathBuf::from("./cache")
        });
        Self::open_in(config, &cache_dir, location)
    }

    pub fn open_in(
        config: &Config,
        cache_dir: &Path,
        location: Arc<dyn LocationProvider>,
    ) -> Result<Self> {
        debug!(?cache_dir, "Opening cache");
        std::fs::create_dir_all(cache_dir)
            .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

        let session = Arc::new(Session::new(cache_dir.to_path_buf()));
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load session, continuing signed out");
        }

        let api = Arc::new(api_client(config, &session)?);

        let store = Arc::new(
            SqliteStore::open(&cache_dir.join(CACHE_DB_FILE))
                .context("Failed to open cache database")?,
        );
        let sync = Arc::new(SyncManager::new(
            Arc::new(SystemClock),
            location,
            config.sync,
            SyncStateStore::open(cache_dir.to_path_buf()),
        ));

        let concurrency = config.backfill_concurrency;
        Ok(Self {
            tickets: repository(&api, &store, &session, &sync, concurrency),
            offices: repository(&api, &store, &session, &sync, concurrency),
            infos: repository(&api, &store, &session, &sync, concurrency),
            session,
            sync,
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn sync(&self) -> &SyncManager {
        &self.sync
    }

    /// Refresh every domain concurrently. Each domain fails on its own.
    pub async fn refresh_all(
        &self,
        force: bool,
    ) -> Vec<(Domain, Result<RefreshOutcome, RepositoryError>)> {
        let (tickets, offices, infos) = tokio::join!(
            self.tickets.refresh(force),
            self.offices.refresh(force),
            self.infos.refresh(force),
        );
        vec![
            (Domain::Ticket, tickets),
            (Domain::Office, offices),
            (Domain::Info, infos),
        ]
    }

    pub fn invalidate_all(&self) {
        for domain in Domain::ALL {
            self.sync.invalidate(domain);
        }
    }
}

/// The token is read from `session` per request, so signing in or out
/// after opening needs no new client.
fn api_client(config: &Config, session: &Arc<Session>) -> Result<ApiClient> {
    let mut api = ApiClient::new(&config.api_base_url).context("Failed to build HTTP client")?;
    api.set_token_provider(session.clone());
    Ok(api)
}

fn repository<E: Entity>(
    api: &Arc<ApiClient>,
    store: &Arc<SqliteStore>,
    session: &Arc<Session>,
    sync: &Arc<SyncManager>,
    concurrency: usize,
) -> Repository<E, SqliteStore> {
    let remote: Arc<dyn RemoteDataSource<E>> = api.clone();
    Repository::new(remote, Arc::clone(store), store.clone(), session.clone(), Arc::clone(sync))
        .with_backfill_concurrency(concurrency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::RemoteError;
    use crate::auth::SessionData;
    use reqwest::header::AUTHORIZATION;
    use crate::providers::NoLocation;
    use crate::testing::ticket;
    use crate::store::LocalStore;
    use tempfile::TempDir;

    fn config() -> Config {
        Config {
            api_base_url: "http://127.0.0.1:9/api".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_open_creates_empty_cache() {
        let dir = TempDir::new().unwrap();
        let app = Neighborly::open_in(&config(), dir.path(), Arc::new(NoLocation)).unwrap();

        assert!(dir.path().join(CACHE_DB_FILE).exists());
        assert!(app.tickets.entities().unwrap().is_empty());
        assert!(app.sync().state(Domain::Office).last_fetch_at.is_none());
    }

    #[test]
    fn test_favorites_follow_the_session() {
        let dir = TempDir::new().unwrap();
        let app = Neighborly::open_in(&config(), dir.path(), Arc::new(NoLocation)).unwrap();
        assert!(matches!(
            app.tickets.toggle_favorite(1),
            Err(RepositoryError::NotAuthenticated)
        ));

        app.session
            .update(SessionData::new("token".to_string(), 5, Some("ada".to_string())));
        assert!(app.tickets.toggle_favorite(1).unwrap());
        // Office favorites are a separate domain
        assert!(app.offices.favorites().unwrap().is_empty());
    }

    #[test]
    fn test_sign_in_after_open_reaches_the_client() {
        let dir = TempDir::new().unwrap();
        let app = Neighborly::open_in(&config(), dir.path(), Arc::new(NoLocation)).unwrap();
        let api = api_client(&config(), &app.session).unwrap();
        assert!(matches!(api.auth_headers(true), Err(RemoteError::MissingCredential)));

        app.session.update(SessionData::new("token".to_string(), 5, None));
        let headers = api.auth_headers(true).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer token");

        app.session.clear().unwrap();
        assert!(api.auth_headers(false).unwrap().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn test_refresh_after_sign_in_sends_credentials() {
        let dir = TempDir::new().unwrap();
        let app = Neighborly::open_in(&config(), dir.path(), Arc::new(NoLocation)).unwrap();
        app.session.update(SessionData::new("token".to_string(), 5, None));

        // Nothing listens on the test URL; the user listing must still get
        // as far as the network instead of failing for lack of a token.
        let result = app.tickets.refresh(true).await;
        assert!(!matches!(
            result,
            Err(RepositoryError::Fetch(RemoteError::MissingCredential))
        ));
    }

    #[test]
    fn test_cache_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let app = Neighborly::open_in(&config(), dir.path(), Arc::new(NoLocation)).unwrap();
            app.tickets.save_draft(&ticket(-3)).unwrap();
        }
        let store = SqliteStore::open(&dir.path().join(CACHE_DB_FILE)).unwrap();
        assert_eq!(store.drafts::<crate::models::Ticket>().unwrap().len(), 1);
    }
}
