//! SessionRepository trait definition.
//!
//! CRUD operations for chat sessions and their messages. Implementations
//! live in chatkeep-infra (e.g., `SqliteSessionRepository`). Uses native
//! async fn in traits (RPITIT, Rust 2024 edition).
//!
//! Convention: `get_*` lookups return `Option` and leave the NotFound
//! decision to the service; mutations of a single row (`update_status`,
//! `touch_session`, `delete_session`) report `NotFound` themselves based
//! on affected row counts.

use chatkeep_types::chat::{ChatMessage, ChatSession, NewMessage, NewSession};
use chatkeep_types::error::StoreError;
use chrono::{DateTime, Utc};

/// Repository trait for chat session and message persistence.
pub trait SessionRepository: Send + Sync {
    /// Insert a new session with `created_at` and `updated_at` set to `now`.
    ///
    /// Fails with `DuplicateKey` when the `session_id` already exists.
    fn insert_session(
        &self,
        draft: &NewSession,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<ChatSession, StoreError>> + Send;

    /// Look up a session by its external id.
    fn get_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, StoreError>> + Send;

    /// Set the session status and refresh `updated_at`.
    ///
    /// Fails with `NotFound` when no row matches.
    fn update_status(
        &self,
        session_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Refresh `updated_at` and reset the status to active on an existing
    /// session (returning-visitor touch).
    ///
    /// Fails with `NotFound` when no row matches.
    fn touch_session(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete a session; associated messages cascade.
    ///
    /// Fails with `NotFound` when no row matches.
    fn delete_session(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// List sessions newest-first, optionally filtered by status.
    fn list_sessions(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatSession>, StoreError>> + Send;

    /// Most recent session recorded for an email address.
    fn find_latest_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, StoreError>> + Send;

    /// Most recent session with a known email for a browser fingerprint.
    fn find_latest_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatSession>, StoreError>> + Send;

    /// Insert a message with `created_at` set to `now` and, in the same
    /// transaction, set the parent session's `last_message_at` (and
    /// `updated_at`) to `now`.
    ///
    /// Fails with `NotFound` when the session does not exist; in that case
    /// no message row is persisted.
    fn insert_message(
        &self,
        session_id: &str,
        draft: &NewMessage,
        now: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<ChatMessage, StoreError>> + Send;

    /// Messages for a session ordered by `created_at ASC`, insertion order
    /// breaking ties. Empty vec when the session has no messages.
    fn list_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> impl std::future::Future<Output = Result<Vec<ChatMessage>, StoreError>> + Send;

    /// Total number of messages in a session.
    fn count_messages(
        &self,
        session_id: &str,
    ) -> impl std::future::Future<Output = Result<u64, StoreError>> + Send;
}
