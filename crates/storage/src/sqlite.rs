use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::domain::QueueDocument;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};

use crate::SnapshotStore;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    database_url: String,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Every connection to an in-memory database gets its own database.
        let max_connections = if is_memory_url(database_url) { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM overlay_snapshot")
            .execute(&self.pool)
            .await
            .context("failed to delete saved queue")?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for Storage {
    async fn load(&self) -> Result<Option<QueueDocument>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT document FROM overlay_snapshot WHERE id = 1")
                .fetch_optional(&self.pool)
                .await
                .context("failed to read saved queue")?;
        raw.map(|raw| serde_json::from_str(&raw).context("saved queue is not valid JSON"))
            .transpose()
    }

    async fn save(&self, document: &QueueDocument) -> Result<()> {
        let raw = serde_json::to_string(document)?;
        let updated_at = document.updated_at.unwrap_or_else(Utc::now).to_rfc3339();
        sqlx::query(
            "INSERT INTO overlay_snapshot (id, document, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document, updated_at = excluded.updated_at",
        )
        .bind(raw)
        .bind(updated_at)
        .execute(&self.pool)
        .await
        .context("failed to write saved queue")?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.database_url.clone()
    }
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}
