use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::UserId;
use crate::providers::{CurrentUserProvider, TokenProvider};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Token expiry time in hours.
const TOKEN_EXPIRY_HOURS: i64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    pub user_id: UserId,
    pub username: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, user_id: UserId, username: Option<String>) -> Self {
        Self {
            token,
            user_id,
            username,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::hours(TOKEN_EXPIRY_HOURS)
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        let expiry = self.created_at + Duration::hours(TOKEN_EXPIRY_HOURS);
        (expiry - Utc::now()).num_minutes().max(0)
    }
}

/// The signed-in user, shared between the API client and the repositories.
pub struct Session {
    cache_dir: Option<PathBuf>,
    data: RwLock<Option<SessionData>>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir: Some(cache_dir),
            data: RwLock::new(None),
        }
    }

    /// A session that is never written to disk.
    pub fn in_memory(data: Option<SessionData>) -> Self {
        Self {
            cache_dir: None,
            data: RwLock::new(data),
        }
    }

    /// Load session from disk. Returns whether a valid session was found.
    pub fn load(&self) -> Result<bool> {
        let Some(path) = self.session_path() else {
            return Ok(self.is_valid());
        };
        if !path.exists() {
            return Ok(false);
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let data: SessionData =
            serde_json::from_str(&contents).context("Failed to parse session file")?;

        if data.is_expired() {
            return Ok(false);
        }
        self.update(data);
        Ok(true)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        let (Some(path), Some(data)) = (self.session_path(), self.data()) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&data)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Clear session data
    pub fn clear(&self) -> Result<()> {
        *self.write() = None;
        if let Some(path) = self.session_path() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn update(&self, data: SessionData) {
        *self.write() = Some(data);
    }

    pub fn data(&self) -> Option<SessionData> {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Get the bearer token if session is valid
    pub fn token(&self) -> Option<String> {
        self.data().filter(|d| !d.is_expired()).map(|d| d.token)
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.data().map(|d| !d.is_expired()).unwrap_or(false)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<SessionData>> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Session lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn session_path(&self) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(SESSION_FILE))
    }
}

impl CurrentUserProvider for Session {
    fn current_user_id(&self) -> Option<UserId> {
        self.data().filter(|d| !d.is_expired()).map(|d| d.user_id)
    }
}

impl TokenProvider for Session {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_session_has_no_user() {
        let mut data = SessionData::new("t".to_string(), 5, None);
        data.created_at = Utc::now() - Duration::hours(TOKEN_EXPIRY_HOURS + 1);
        let session = Session::in_memory(Some(data));
        assert!(!session.is_valid());
        assert_eq!(session.current_user_id(), None);
        assert_eq!(session.token(), None);
    }

    #[test]
    fn test_session_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(dir.path().to_path_buf());
        session.update(SessionData::new("secret".to_string(), 9, Some("ana".to_string())));
        session.save().unwrap();

        let reloaded = Session::new(dir.path().to_path_buf());
        assert!(reloaded.load().unwrap());
        assert_eq!(reloaded.current_user_id(), Some(9));
        assert_eq!(reloaded.token().as_deref(), Some("secret"));

        reloaded.clear().unwrap();
        assert!(!dir.path().join(SESSION_FILE).exists());
        assert_eq!(reloaded.current_user_id(), None);
    }
}
