use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Opens a read-only SQLite pool over the lesson planner database.
/// Fails if the file does not exist; the AI service never creates it.
pub async fn create_pool(database_path: &Path, busy_timeout: Duration) -> Result<SqlitePool> {
    info!("Opening SQLite database at {}...", database_path.display());

    let options = SqliteConnectOptions::new()
        .filename(database_path)
        .read_only(true)
        .create_if_missing(false)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Database file not usable: {}", database_path.display()))?;

    info!("SQLite connection pool established");
    Ok(pool)
}
