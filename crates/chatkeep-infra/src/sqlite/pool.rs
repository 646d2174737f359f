//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. This module provides a
//! `DatabasePool` with a multi-connection reader pool for concurrent reads
//! and a single-connection writer pool for serialized writes. Both use WAL
//! journal mode and enforce foreign keys (the message cascade depends on
//! that pragma).

use chatkeep_types::config::StoreConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: Multi-connection pool for concurrent SELECT queries.
/// - `writer`: Single-connection pool for serialized INSERT/UPDATE/DELETE.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Create a new DatabasePool with default settings for the given URL.
    ///
    /// Runs migrations automatically on the writer pool before the reader
    /// pool opens, so a freshly created database is fully usable.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_config(database_url, &StoreConfig::default()).await
    }

    /// Create a new DatabasePool honoring pool sizing from `StoreConfig`.
    pub async fn with_config(
        database_url: &str,
        config: &StoreConfig,
    ) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(config.busy_timeout_secs))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.max_read_connections)
            .connect_with(read_opts)
            .await?;

        Ok(Self { reader, writer })
    }

    /// Open the pool described by `{data_dir}/config.toml`.
    ///
    /// Uses the config's `database_url` when set, otherwise derives
    /// `sqlite://{data_dir}/chatkeep.db`.
    pub async fn from_data_dir(data_dir: &Path) -> Result<Self, sqlx::Error> {
        let config = crate::config::load_store_config(data_dir).await;
        let url = match &config.database_url {
            Some(url) => url.clone(),
            None => format!("sqlite://{}/chatkeep.db", data_dir.display()),
        };
        Self::with_config(&url, &config).await
    }
}

/// Returns the default database URL based on the `CHATKEEP_DATA_DIR` env
/// var, falling back to `~/.chatkeep/chatkeep.db`.
pub fn default_database_url() -> String {
    let data_dir = std::env::var("CHATKEEP_DATA_DIR").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.chatkeep")
    });
    format!("sqlite://{data_dir}/chatkeep.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creates_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert!(table_names.contains(&"chat_sessions"), "chat_sessions table missing");
        assert!(table_names.contains(&"chat_messages"), "chat_messages table missing");
    }

    #[tokio::test]
    async fn test_pool_migration_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test_rerun.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        // Opening the same database twice re-runs the migration check.
        let first = DatabasePool::new(&url).await.unwrap();
        drop(first);
        DatabasePool::new(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_pool_wal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test_wal.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();

        assert_eq!(result.0.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn test_pool_foreign_keys_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test_fk.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let pool = DatabasePool::new(&url).await.unwrap();

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool.writer)
            .await
            .unwrap();

        assert_eq!(result.0, 1, "foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_from_data_dir_derives_url() {
        let dir = tempfile::tempdir().unwrap();

        let _pool = DatabasePool::from_data_dir(dir.path()).await.unwrap();

        assert!(dir.path().join("chatkeep.db").exists());
    }

    #[tokio::test]
    async fn test_from_data_dir_honors_configured_url() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("custom.db");
        tokio::fs::write(
            dir.path().join("config.toml"),
            format!("database_url = \"sqlite://{}?mode=rwc\"\n", db_path.display()),
        )
        .await
        .unwrap();

        let _pool = DatabasePool::from_data_dir(dir.path()).await.unwrap();

        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_default_database_url() {
        let url = default_database_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("chatkeep.db"));
    }
}
