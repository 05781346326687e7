// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of [`ClientStateStore`].

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use switchboard_config::model::StorageConfig;
use switchboard_core::{Actor, ClientStateStore, StateKey, SwitchboardError};

use crate::database::{Database, map_tr_err};

/// Per-actor key/value rows in the `client_state` table.
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    /// Open the configured database file.
    pub async fn open(config: &StorageConfig) -> Result<Self, SwitchboardError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        Ok(Self { db })
    }

    pub async fn in_memory() -> Result<Self, SwitchboardError> {
        Ok(Self {
            db: Database::open_in_memory().await?,
        })
    }

    pub async fn close(&self) -> Result<(), SwitchboardError> {
        self.db.checkpoint().await
    }
}

#[async_trait]
impl ClientStateStore for SqliteStateStore {
    async fn load(&self, actor: Actor, key: StateKey) -> Result<Option<String>, SwitchboardError> {
        let (actor, key) = (actor.to_string(), key.as_key());
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM client_state WHERE actor = ?1 AND key = ?2",
                    params![actor, key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn save(&self, actor: Actor, key: StateKey, value: String) -> Result<(), SwitchboardError> {
        let (actor, key) = (actor.to_string(), key.as_key());
        let now = chrono::Utc::now().to_rfc3339();
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO client_state (actor, key, value, updated_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (actor, key) DO UPDATE
                     SET value = excluded.value, updated_at = excluded.updated_at",
                    params![actor, key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn remove(&self, actor: Actor, key: StateKey) -> Result<(), SwitchboardError> {
        let (actor, key) = (actor.to_string(), key.as_key());
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM client_state WHERE actor = ?1 AND key = ?2",
                    params![actor, key],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{OperatorId, Role};
    use tempfile::tempdir;

    fn operator() -> Actor {
        Actor::operator(OperatorId(3))
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save(operator(), StateKey::Presence, "ONLINE".into())
            .await
            .unwrap();
        let value = store.load(operator(), StateKey::Presence).await.unwrap();
        assert_eq!(value.as_deref(), Some("ONLINE"));
    }

    #[tokio::test]
    async fn save_overwrites() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let key = StateKey::Unread(Role::Operator);
        store.save(operator(), key, "1".into()).await.unwrap();
        store.save(operator(), key, "4".into()).await.unwrap();
        assert_eq!(store.load(operator(), key).await.unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn keys_are_scoped_per_actor_and_role() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        let supervisor = Actor::supervisor(3);
        store
            .save(operator(), StateKey::Unread(Role::Operator), "2".into())
            .await
            .unwrap();

        assert!(store
            .load(supervisor, StateKey::Unread(Role::Operator))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .load(operator(), StateKey::Unread(Role::Supervisor))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let store = SqliteStateStore::in_memory().await.unwrap();
        store
            .save(operator(), StateKey::LastSession, "42".into())
            .await
            .unwrap();
        store.remove(operator(), StateKey::LastSession).await.unwrap();
        assert!(store.load(operator(), StateKey::LastSession).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("nested").join("client.db").display().to_string(),
            wal_mode: true,
        };

        let store = SqliteStateStore::open(&config).await.unwrap();
        store
            .save(operator(), StateKey::LastSession, "42".into())
            .await
            .unwrap();
        store.close().await.unwrap();
        drop(store);

        let reopened = SqliteStateStore::open(&config).await.unwrap();
        assert_eq!(
            reopened.load(operator(), StateKey::LastSession).await.unwrap().as_deref(),
            Some("42")
        );
    }
}
