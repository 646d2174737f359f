//! Store configuration types for Chatkeep.
//!
//! `StoreConfig` represents the `config.toml` in the data directory that
//! controls how the SQLite pool is opened.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Chatkeep store.
///
/// Loaded from `{data_dir}/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database URL override. When absent, the store derives a
    /// `sqlite://` URL from the data directory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum connections in the read-only pool.
    #[serde(default = "default_max_read_connections")]
    pub max_read_connections: u32,

    /// SQLite busy timeout in seconds.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_max_read_connections() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_read_connections: default_max_read_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default_values() {
        let config = StoreConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.max_read_connections, 8);
        assert_eq!(config.busy_timeout_secs, 5);
    }

    #[test]
    fn test_store_config_deserialize_with_defaults() {
        let config: StoreConfig = toml::from_str("").unwrap();
        assert_eq!(config.max_read_connections, 8);
    }

    #[test]
    fn test_store_config_deserialize_with_values() {
        let config: StoreConfig = toml::from_str(
            r#"
            database_url = "sqlite:///tmp/chat.db"
            max_read_connections = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("sqlite:///tmp/chat.db"));
        assert_eq!(config.max_read_connections, 4);
        assert_eq!(config.busy_timeout_secs, 5);
    }
}
