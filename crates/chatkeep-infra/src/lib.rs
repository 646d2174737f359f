//! Infrastructure layer for Chatkeep.
//!
//! Contains the SQLite implementation of the `SessionRepository` trait
//! defined in `chatkeep-core`, plus the config.toml loader.

pub mod config;
pub mod sqlite;
