//! Durable key/value persistence for the session credential
//!
//! The session writes its token and user as two entries that must appear and
//! disappear together; [`CredentialStore::set_all`] and
//! [`CredentialStore::remove_all`] carry that requirement, and the SQLite
//! backend runs both inside one transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

/// Storage key holding the bearer token.
pub const TOKEN_KEY: &str = "booktrack.token";
/// Storage key holding the signed-in user as JSON.
pub const USER_KEY: &str = "booktrack.user";

/// Key/value credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Writes every entry. Backends that can should make this atomic.
    async fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

/// Process-local store, used by tests and by callers that do not need the
/// session to survive a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// SQLite-backed store (sqlx).
pub struct SqliteCredentialStore {
    db: Pool<Sqlite>,
}

impl SqliteCredentialStore {
    /// Opens (or creates) the database at `db_url` and ensures the table exists.
    ///
    /// `db_url` is a sqlx URL such as `sqlite://booktrack.db?mode=rwc`.
    pub async fn connect(db_url: &str) -> Result<Self> {
        info!("[Store] opening credential store: {}", db_url);
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await
            .with_context(|| format!("failed to open SQLite database: {db_url}"))?;
        Self::with_pool(db).await
    }

    /// Uses an existing pool; the table is created if missing.
    pub async fn with_pool(db: Pool<Sqlite>) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&db)
        .await
        .context("failed to create credentials table")?;
        Ok(Self { db })
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO credentials (key, value, updated_at) VALUES (?, ?, ?)
    ON CONFLICT(key) DO UPDATE SET
        value = excluded.value,
        updated_at = excluded.updated_at
"#;

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM credentials WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("failed to read credential entry {key}"))?;
        Ok(row.map(|r| r.get::<String, _>("value")))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_SQL)
            .bind(key)
            .bind(value)
            .bind(chrono::Utc::now())
            .execute(&self.db)
            .await
            .with_context(|| format!("failed to write credential entry {key}"))?;
        debug!("[Store] wrote entry {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM credentials WHERE key = ?")
            .bind(key)
            .execute(&self.db)
            .await
            .with_context(|| format!("failed to remove credential entry {key}"))?;
        debug!("[Store] removed entry {}", key);
        Ok(())
    }

    async fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let now = chrono::Utc::now();
        let mut tx = self.db.begin().await.context("failed to begin transaction")?;
        for (key, value) in entries {
            sqlx::query(UPSERT_SQL)
                .bind(*key)
                .bind(*value)
                .bind(now)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to write credential entry {key}"))?;
        }
        tx.commit().await.context("failed to commit credential entries")?;
        debug!("[Store] wrote {} entries atomically", entries.len());
        Ok(())
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut tx = self.db.begin().await.context("failed to begin transaction")?;
        for key in keys {
            sqlx::query("DELETE FROM credentials WHERE key = ?")
                .bind(*key)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to remove credential entry {key}"))?;
        }
        tx.commit().await.context("failed to commit credential removal")?;
        debug!("[Store] removed {} entries atomically", keys.len());
        Ok(())
    }
}
