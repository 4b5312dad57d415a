use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Sqlite, Transaction};
use std::str::FromStr;
use tracing::{debug, info};

use super::MemoryStore;
use crate::config::StoreConfig;
use crate::models::{IdentityKey, ListingRecord, MemoryUpdate, NormalizedPrice, SeenItem, SeenMemory};
use crate::utils::error::Result;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS seen_items (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        id_key TEXT NOT NULL,
        last_price TEXT NOT NULL,
        first_seen_at TEXT NOT NULL,
        last_updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_seen_items_key ON seen_items (id_key, id)",
    r#"
    CREATE TABLE IF NOT EXISTS listing_snapshot (
        position INTEGER NOT NULL,
        source TEXT NOT NULL,
        name TEXT NOT NULL,
        color TEXT NOT NULL,
        price TEXT NOT NULL,
        link TEXT NOT NULL,
        image TEXT,
        captured_at TEXT NOT NULL
    )
    "#,
];

/// One row of the human-facing listing table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct SnapshotRow {
    pub position: i64,
    pub source: String,
    pub name: String,
    pub color: String,
    pub price: String,
    pub link: String,
    pub image: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);

        if let Some(parent) = options.clone().get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        info!(database_url = %config.database_url, "memory store ready");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Every memory row of a key, oldest first.
    pub async fn history(&self, key: &IdentityKey) -> Result<Vec<SeenItem>> {
        let rows = sqlx::query_as::<_, SeenItem>(
            "SELECT id, id_key, last_price, first_seen_at, last_updated_at
             FROM seen_items WHERE id_key = ? ORDER BY id ASC",
        )
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn snapshot(&self) -> Result<Vec<SnapshotRow>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            "SELECT position, source, name, color, price, link, image, captured_at
             FROM listing_snapshot ORDER BY position ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn replace_snapshot(tx: &mut Transaction<'_, Sqlite>, snapshot: &[ListingRecord]) -> Result<()> {
        let captured_at = Utc::now();

        sqlx::query("DELETE FROM listing_snapshot").execute(&mut **tx).await?;

        for (position, record) in snapshot.iter().enumerate() {
            sqlx::query(
                "INSERT INTO listing_snapshot (position, source, name, color, price, link, image, captured_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(position as i64)
            .bind(record.source())
            .bind(record.name())
            .bind(record.color())
            .bind(record.price())
            .bind(record.link())
            .bind(record.image())
            .bind(captured_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    async fn load_memory(&self) -> Result<SeenMemory> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id_key, last_price FROM seen_items
             WHERE id IN (SELECT MAX(id) FROM seen_items GROUP BY id_key)",
        )
        .fetch_all(&self.pool)
        .await?;

        debug!(keys = rows.len(), "loaded seen memory");

        Ok(rows
            .into_iter()
            .map(|(key, price)| (IdentityKey::new(key), NormalizedPrice::new(price)))
            .collect())
    }

    async fn record_run(&self, updates: &[MemoryUpdate], snapshot: &[ListingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for update in updates {
            // first_seen_at comes from the oldest row of the key, if any
            sqlx::query(
                "INSERT INTO seen_items (id_key, last_price, first_seen_at, last_updated_at)
                 SELECT ?1, ?2,
                        COALESCE((SELECT first_seen_at FROM seen_items WHERE id_key = ?1 ORDER BY id ASC LIMIT 1), ?3),
                        ?3",
            )
            .bind(update.key.as_str())
            .bind(update.price.as_str())
            .bind(update.recorded_at)
            .execute(&mut *tx)
            .await?;
        }

        Self::replace_snapshot(&mut tx, snapshot).await?;
        tx.commit().await?;

        info!(updates = updates.len(), snapshot = snapshot.len(), "recorded run");
        Ok(())
    }

    async fn write_snapshot(&self, snapshot: &[ListingRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::replace_snapshot(&mut tx, snapshot).await?;
        tx.commit().await?;

        debug!(snapshot = snapshot.len(), "rewrote listing snapshot");
        Ok(())
    }
}
