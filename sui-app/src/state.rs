//! Durable key-value state: the refresh token and the last-replied
//! message id. One sqlite table, opened per operation off the async
//! runtime via `spawn_blocking`.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use sui_youtube::CredentialStore;

const KEY_REFRESH_TOKEN: &str = "refresh_token";
const KEY_LAST_REPLIED: &str = "last_replied_message_id";

/// Dedup side of the state store, consumed by the run cycle.
#[async_trait::async_trait]
pub trait DedupStore: Send + Sync {
    async fn last_replied(&self) -> Result<Option<String>>;
    async fn record_replied(&self, message_id: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStateStore {
    path: PathBuf,
}

impl SqliteStateStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("create state dir {}", parent.display()))?;
            }
        }

        let init_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = open_conn(&init_path)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS bot_state (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
                [],
            )?;
            Ok(())
        })
        .await??;

        Ok(Self { path })
    }

    /// Write the configured refresh token only when the store has none,
    /// so a live credential is never clobbered by stale config.
    pub async fn seed_refresh_token(&self, token: &str) -> Result<bool> {
        let path = self.path.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let conn = open_conn(&path)?;
            let inserted = conn.execute(
                "INSERT INTO bot_state (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO NOTHING",
                params![KEY_REFRESH_TOKEN, token],
            )?;
            Ok(inserted > 0)
        })
        .await?
    }

    async fn get(&self, key: &'static str) -> Result<Option<String>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = open_conn(&path)?;
            let mut stmt = conn.prepare("SELECT value FROM bot_state WHERE key = ?1")?;
            let mut rows = stmt.query(params![key])?;
            match rows.next()? {
                Some(row) => Ok(Some(row.get(0)?)),
                None => Ok(None),
            }
        })
        .await?
    }

    async fn set(&self, key: &'static str, value: String) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = open_conn(&path)?;
            conn.execute(
                "INSERT INTO bot_state (key, value) VALUES (?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )?;
            Ok(())
        })
        .await?
    }
}

fn open_conn(path: &Path) -> Result<Connection> {
    Connection::open(path).with_context(|| format!("open state db {}", path.display()))
}

#[async_trait::async_trait]
impl CredentialStore for SqliteStateStore {
    async fn refresh_token(&self) -> Result<Option<String>> {
        self.get(KEY_REFRESH_TOKEN).await
    }

    async fn store_refresh_token(&self, token: &str) -> Result<()> {
        self.set(KEY_REFRESH_TOKEN, token.to_string()).await
    }
}

#[async_trait::async_trait]
impl DedupStore for SqliteStateStore {
    async fn last_replied(&self) -> Result<Option<String>> {
        self.get(KEY_LAST_REPLIED).await
    }

    async fn record_replied(&self, message_id: &str) -> Result<()> {
        self.set(KEY_LAST_REPLIED, message_id.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> SqliteStateStore {
        SqliteStateStore::open(dir.path().join("state.db"))
            .await
            .expect("open store")
    }

    #[tokio::test]
    async fn refresh_token_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir).await;

        assert_eq!(store.refresh_token().await.expect("get"), None);
        store.store_refresh_token("tok-1").await.expect("set");
        assert_eq!(
            store.refresh_token().await.expect("get"),
            Some("tok-1".to_string())
        );
    }

    #[tokio::test]
    async fn seed_does_not_overwrite_an_existing_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(&dir).await;

        assert!(store.seed_refresh_token("from-env").await.expect("seed"));
        store.store_refresh_token("from-callback").await.expect("set");
        assert!(!store.seed_refresh_token("from-env").await.expect("seed"));
        assert_eq!(
            store.refresh_token().await.expect("get"),
            Some("from-callback".to_string())
        );
    }

    #[tokio::test]
    async fn dedup_id_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.db");

        {
            let store = SqliteStateStore::open(&path).await.expect("open");
            store.record_replied("msg-42").await.expect("record");
        }

        let reopened = SqliteStateStore::open(&path).await.expect("reopen");
        assert_eq!(
            reopened.last_replied().await.expect("get"),
            Some("msg-42".to_string())
        );
    }
}
