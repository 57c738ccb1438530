//! SQLite connection and document records.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Settings;

pub async fn connect(settings: &Settings) -> Result<SqlitePool> {
    connect_path(&settings.db_path).await
}

/// Open (creating if needed) the database at `db_path` in WAL mode with
/// foreign keys enforced.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Insert a `documents` row for a stored file. Returns the new row id.
pub async fn insert_document(pool: &SqlitePool, path: &str, meta: &serde_json::Value) -> Result<i64> {
    let meta = serde_json::to_string(meta)?;
    let result = sqlx::query("INSERT INTO documents (path, meta) VALUES (?, ?)")
        .bind(path)
        .bind(meta)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}
