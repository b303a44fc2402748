//! SQLite-backed store. Records are kept as serialized JSON blobs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::watch;
use tracing::debug;

use crate::models::{Domain, Entity, EntityId, FavoriteMarker, UserId};

use super::{ChangeFeed, FavoriteStore, LocalStore, StoreError};

const PARTITION_GENERAL: &str = "general";
const PARTITION_DRAFTS: &str = "drafts";

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Cached entities (stores serialized JSON), ordered per partition
CREATE TABLE IF NOT EXISTS entity_cache (
    domain TEXT NOT NULL,
    partition TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (domain, partition, entity_id)
);

CREATE INDEX IF NOT EXISTS idx_entity_cache_position
    ON entity_cache(domain, partition, position);

-- Favorite markers, independent of whether the entity is cached
CREATE TABLE IF NOT EXISTS favorites (
    user_id INTEGER NOT NULL,
    domain TEXT NOT NULL,
    entity_id INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (user_id, domain, entity_id)
);
"#;

/// SQLite-based store implementation.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: ChangeFeed,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened cache database");
        Self::with_connection(conn)
    }

    /// A throwaway database, used by tests and by hosts without storage.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(CACHE_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            changes: ChangeFeed::new(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn load_partition<E: Entity>(&self, partition: &str) -> Result<Vec<E>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT data FROM entity_cache
             WHERE domain = ? AND partition = ?
             ORDER BY position",
        )?;
        let blobs: Vec<Vec<u8>> = stmt
            .query_map(params![E::DOMAIN.feature_key(), partition], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        blobs
            .iter()
            .map(|data| serde_json::from_slice(data).map_err(StoreError::from))
            .collect()
    }

    /// Overwrite-or-append by id inside one partition, in a single transaction.
    fn merge_into<E: Entity>(&self, partition: &str, entities: &[E]) -> Result<(), StoreError> {
        let encoded: Vec<(EntityId, Vec<u8>)> = entities
            .iter()
            .map(|e| serde_json::to_vec(e).map(|data| (e.id(), data)))
            .collect::<Result<_, _>>()?;
        let domain = E::DOMAIN.feature_key();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let next_position: i64 = tx.query_row(
                "SELECT COALESCE(MAX(position) + 1, 0) FROM entity_cache
                 WHERE domain = ? AND partition = ?",
                params![domain, partition],
                |row| row.get(0),
            )?;
            let mut update = tx.prepare(
                "UPDATE entity_cache SET data = ?, cached_at = datetime('now')
                 WHERE domain = ? AND partition = ? AND entity_id = ?",
            )?;
            let mut insert = tx.prepare(
                "INSERT INTO entity_cache (domain, partition, entity_id, position, data)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            let mut position = next_position;
            for (id, data) in &encoded {
                if update.execute(params![data, domain, partition, id])? == 0 {
                    insert.execute(params![domain, partition, id, position, data])?;
                    position += 1;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl LocalStore for SqliteStore {
    fn replace_all<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError> {
        let encoded: Vec<(EntityId, Vec<u8>)> = entities
            .iter()
            .map(|e| serde_json::to_vec(e).map(|data| (e.id(), data)))
            .collect::<Result<_, _>>()?;
        let domain = E::DOMAIN.feature_key();

        {
            let mut conn = self.lock()?;
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM entity_cache WHERE domain = ? AND partition = ?",
                params![domain, PARTITION_GENERAL],
            )?;
            {
                // OR REPLACE keeps the last record when the caller passes duplicate ids.
                let mut insert = tx.prepare(
                    "INSERT OR REPLACE INTO entity_cache (domain, partition, entity_id, position, data)
                     VALUES (?, ?, ?, ?, ?)",
                )?;
                for (position, (id, data)) in encoded.iter().enumerate() {
                    insert.execute(params![domain, PARTITION_GENERAL, id, position as i64, data])?;
                }
            }
            tx.commit()?;
        }

        debug!(domain = domain, count = encoded.len(), "Replaced cached entities");
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn upsert<E: Entity>(&self, entities: &[E]) -> Result<(), StoreError> {
        self.merge_into(PARTITION_GENERAL, entities)?;
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn get_all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.load_partition(PARTITION_GENERAL)
    }

    fn get<E: Entity>(&self, id: EntityId) -> Result<Option<E>, StoreError> {
        let conn = self.lock()?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT data FROM entity_cache
                 WHERE domain = ? AND partition = ? AND entity_id = ?",
                params![E::DOMAIN.feature_key(), PARTITION_GENERAL, id],
                |row| row.get(0),
            )
            .optional()?;
        drop(conn);

        data.map(|d| serde_json::from_slice(&d).map_err(StoreError::from))
            .transpose()
    }

    fn save_draft<E: Entity>(&self, draft: &E) -> Result<(), StoreError> {
        self.merge_into(PARTITION_DRAFTS, std::slice::from_ref(draft))?;
        self.changes.notify(E::DOMAIN);
        Ok(())
    }

    fn drafts<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        self.load_partition(PARTITION_DRAFTS)
    }

    fn delete_draft<E: Entity>(&self, id: EntityId) -> Result<bool, StoreError> {
        let removed = self.lock()?.execute(
            "DELETE FROM entity_cache WHERE domain = ? AND partition = ? AND entity_id = ?",
            params![E::DOMAIN.feature_key(), PARTITION_DRAFTS, id],
        )?;
        if removed > 0 {
            self.changes.notify(E::DOMAIN);
        }
        Ok(removed > 0)
    }

    fn subscribe(&self, domain: Domain) -> watch::Receiver<u64> {
        self.changes.subscribe(domain)
    }
}

impl FavoriteStore for SqliteStore {
    fn favorite_ids(
        &self,
        user_id: UserId,
        domain: Domain,
    ) -> Result<HashSet<EntityId>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT entity_id FROM favorites WHERE user_id = ? AND domain = ?")?;
        let ids = stmt
            .query_map(params![user_id, domain.feature_key()], |row| row.get(0))?
            .collect::<Result<HashSet<EntityId>, _>>()?;
        Ok(ids)
    }

    fn set_favorite(&self, marker: &FavoriteMarker, favorite: bool) -> Result<(), StoreError> {
        let domain = marker.domain.feature_key();
        let sql = if favorite {
            "INSERT OR IGNORE INTO favorites (user_id, domain, entity_id) VALUES (?, ?, ?)"
        } else {
            "DELETE FROM favorites WHERE user_id = ? AND domain = ? AND entity_id = ?"
        };
        let changed = self
            .lock()?
            .execute(sql, params![marker.user_id, domain, marker.entity_id])?;
        if changed > 0 {
            self.changes.notify_favorites();
        }
        Ok(())
    }

    fn subscribe_favorites(&self) -> watch::Receiver<u64> {
        self.changes.subscribe_favorites()
    }
}
