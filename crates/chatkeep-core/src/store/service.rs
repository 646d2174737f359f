//! Chat service enforcing validation and lookup policy over a repository.
//!
//! `ChatService` assigns timestamps, validates required input, and converts
//! absent rows into `NotFound`. It is generic over `SessionRepository` so
//! the core crate never depends on the storage backend.

use chatkeep_types::chat::{
    ChatMessage, ChatSession, NewMessage, NewSession, ReturningUser,
};
use chatkeep_types::error::StoreError;
use chrono::Utc;
use tracing::{info, warn};

use crate::store::repository::SessionRepository;

/// Orchestrates session lifecycle and message persistence.
pub struct ChatService<R: SessionRepository> {
    repo: R,
}

impl<R: SessionRepository> ChatService<R> {
    /// Create a new service over the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // --- Session lifecycle ---

    /// Create a new session.
    ///
    /// Fails with `Validation` when `session_id` is empty and with
    /// `DuplicateKey` when it is already taken. Uniqueness is enforced by
    /// the store's unique index, never by read-then-write.
    pub async fn create_session(&self, draft: NewSession) -> Result<ChatSession, StoreError> {
        validate_session_id(&draft.session_id)?;

        let session = self.repo.insert_session(&draft, Utc::now()).await?;
        info!(session_id = %session.session_id, "Session created");
        Ok(session)
    }

    /// Get a session by its external id, failing with `NotFound` if absent.
    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession, StoreError> {
        self.repo
            .get_session(session_id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Return the existing session for `draft.session_id`, or create one.
    ///
    /// An existing session is touched (status reset to active, `updated_at`
    /// refreshed). The bool reports whether a new row was created. A lost
    /// race on creation is resolved by re-reading the winner's row.
    pub async fn get_or_create_session(
        &self,
        draft: NewSession,
    ) -> Result<(ChatSession, bool), StoreError> {
        validate_session_id(&draft.session_id)?;

        if self.repo.get_session(&draft.session_id).await?.is_some() {
            self.repo.touch_session(&draft.session_id, Utc::now()).await?;
            let session = self.get_session(&draft.session_id).await?;
            return Ok((session, false));
        }

        match self.repo.insert_session(&draft, Utc::now()).await {
            Ok(session) => {
                info!(session_id = %session.session_id, "Session created");
                Ok((session, true))
            }
            // A concurrent caller created the row between our read and
            // insert; their row wins.
            Err(StoreError::DuplicateKey(_)) => {
                let session = self.get_session(&draft.session_id).await?;
                Ok((session, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Update a session's lifecycle status.
    pub async fn update_session_status(
        &self,
        session_id: &str,
        status: &str,
    ) -> Result<(), StoreError> {
        if status.trim().is_empty() {
            return Err(StoreError::Validation(
                "status must not be empty".to_string(),
            ));
        }

        self.repo
            .update_status(session_id, status, Utc::now())
            .await?;
        info!(session_id = %session_id, status = %status, "Session status updated");
        Ok(())
    }

    /// Delete a session and, by cascade, all its messages.
    ///
    /// Reports `NotFound` for an unknown `session_id`; callers that want
    /// idempotent deletes treat that as success.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.repo.delete_session(session_id).await?;
        info!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// List sessions newest-first, optionally filtered by status.
    pub async fn list_sessions(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, StoreError> {
        self.repo.list_sessions(status, limit, offset).await
    }

    /// Look up contact details from a visitor's previous sessions.
    ///
    /// Prefers an exact email match; falls back to the browser fingerprint,
    /// considering only prior sessions that captured an email.
    pub async fn find_returning_user(
        &self,
        email: Option<&str>,
        fingerprint: Option<&str>,
    ) -> Result<Option<ReturningUser>, StoreError> {
        if let Some(email) = email {
            if let Some(prior) = self.repo.find_latest_by_email(email).await? {
                return Ok(Some(ReturningUser {
                    email: prior.email,
                    name: prior.name,
                }));
            }
        }

        if let Some(fingerprint) = fingerprint {
            if let Some(prior) = self.repo.find_latest_by_fingerprint(fingerprint).await? {
                return Ok(Some(ReturningUser {
                    email: prior.email,
                    name: prior.name,
                }));
            }
        }

        Ok(None)
    }

    // --- Message persistence ---

    /// Append a message to a session.
    ///
    /// Fails with `Validation` on an empty body and `NotFound` when the
    /// session does not exist (in which case nothing is persisted). The
    /// message insert and the parent's `last_message_at` update are applied
    /// atomically by the repository.
    pub async fn append_message(
        &self,
        session_id: &str,
        draft: NewMessage,
    ) -> Result<ChatMessage, StoreError> {
        if draft.message.trim().is_empty() {
            return Err(StoreError::Validation(
                "message must not be empty".to_string(),
            ));
        }
        if draft.message_type.trim().is_empty() {
            return Err(StoreError::Validation(
                "message_type must not be empty".to_string(),
            ));
        }

        match self.repo.insert_message(session_id, &draft, Utc::now()).await {
            Ok(message) => Ok(message),
            Err(StoreError::NotFound) => {
                warn!(session_id = %session_id, "Attempted to append message to non-existent session");
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Messages for a session in chronological order.
    pub async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        self.repo.list_messages(session_id, limit, offset).await
    }

    /// Total number of messages in a session.
    pub async fn count_messages(&self, session_id: &str) -> Result<u64, StoreError> {
        self.repo.count_messages(session_id).await
    }
}

fn validate_session_id(session_id: &str) -> Result<(), StoreError> {
    if session_id.trim().is_empty() {
        return Err(StoreError::Validation(
            "session_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatkeep_types::chat::Sender;
    use chrono::{DateTime, Utc};

    /// Repository stub that panics on any call; used to verify validation
    /// rejects bad input before touching storage.
    struct UnreachableRepo;

    impl SessionRepository for UnreachableRepo {
        async fn insert_session(
            &self,
            _draft: &NewSession,
            _now: DateTime<Utc>,
        ) -> Result<ChatSession, StoreError> {
            panic!("repository should not be reached")
        }

        async fn get_session(&self, _session_id: &str) -> Result<Option<ChatSession>, StoreError> {
            panic!("repository should not be reached")
        }

        async fn update_status(
            &self,
            _session_id: &str,
            _status: &str,
            _now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            panic!("repository should not be reached")
        }

        async fn touch_session(
            &self,
            _session_id: &str,
            _now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            panic!("repository should not be reached")
        }

        async fn delete_session(&self, _session_id: &str) -> Result<(), StoreError> {
            panic!("repository should not be reached")
        }

        async fn list_sessions(
            &self,
            _status: Option<&str>,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatSession>, StoreError> {
            panic!("repository should not be reached")
        }

        async fn find_latest_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<ChatSession>, StoreError> {
            panic!("repository should not be reached")
        }

        async fn find_latest_by_fingerprint(
            &self,
            _fingerprint: &str,
        ) -> Result<Option<ChatSession>, StoreError> {
            panic!("repository should not be reached")
        }

        async fn insert_message(
            &self,
            _session_id: &str,
            _draft: &NewMessage,
            _now: DateTime<Utc>,
        ) -> Result<ChatMessage, StoreError> {
            panic!("repository should not be reached")
        }

        async fn list_messages(
            &self,
            _session_id: &str,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatMessage>, StoreError> {
            panic!("repository should not be reached")
        }

        async fn count_messages(&self, _session_id: &str) -> Result<u64, StoreError> {
            panic!("repository should not be reached")
        }
    }

    /// Repository stub simulating a lost creation race: the first read
    /// misses, the insert hits the unique index, and the re-read returns
    /// the row the concurrent winner created.
    struct RacingRepo {
        gets: std::sync::atomic::AtomicUsize,
        winner: ChatSession,
    }

    impl RacingRepo {
        fn new(winner: ChatSession) -> Self {
            Self {
                gets: std::sync::atomic::AtomicUsize::new(0),
                winner,
            }
        }
    }

    impl SessionRepository for RacingRepo {
        async fn insert_session(
            &self,
            draft: &NewSession,
            _now: DateTime<Utc>,
        ) -> Result<ChatSession, StoreError> {
            Err(StoreError::DuplicateKey(format!(
                "session_id '{}'",
                draft.session_id
            )))
        }

        async fn get_session(&self, _session_id: &str) -> Result<Option<ChatSession>, StoreError> {
            let calls = self
                .gets
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if calls == 0 {
                Ok(None)
            } else {
                Ok(Some(self.winner.clone()))
            }
        }

        async fn update_status(
            &self,
            _session_id: &str,
            _status: &str,
            _now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            panic!("update_status should not be reached")
        }

        async fn touch_session(
            &self,
            _session_id: &str,
            _now: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            panic!("touch_session should not be reached")
        }

        async fn delete_session(&self, _session_id: &str) -> Result<(), StoreError> {
            panic!("delete_session should not be reached")
        }

        async fn list_sessions(
            &self,
            _status: Option<&str>,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatSession>, StoreError> {
            panic!("list_sessions should not be reached")
        }

        async fn find_latest_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<ChatSession>, StoreError> {
            panic!("find_latest_by_email should not be reached")
        }

        async fn find_latest_by_fingerprint(
            &self,
            _fingerprint: &str,
        ) -> Result<Option<ChatSession>, StoreError> {
            panic!("find_latest_by_fingerprint should not be reached")
        }

        async fn insert_message(
            &self,
            _session_id: &str,
            _draft: &NewMessage,
            _now: DateTime<Utc>,
        ) -> Result<ChatMessage, StoreError> {
            panic!("insert_message should not be reached")
        }

        async fn list_messages(
            &self,
            _session_id: &str,
            _limit: Option<i64>,
            _offset: Option<i64>,
        ) -> Result<Vec<ChatMessage>, StoreError> {
            panic!("list_messages should not be reached")
        }

        async fn count_messages(&self, _session_id: &str) -> Result<u64, StoreError> {
            panic!("count_messages should not be reached")
        }
    }

    fn make_session(session_id: &str) -> ChatSession {
        ChatSession {
            id: 7,
            session_id: session_id.to_string(),
            user_id: None,
            email: None,
            name: None,
            browser_fingerprint: None,
            ip_address: None,
            user_agent: None,
            status: "active".to_string(),
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_message_at: None,
        }
    }

    #[tokio::test]
    async fn test_get_or_create_lost_race_returns_winner() {
        let winner = make_session("abc123");
        let service = ChatService::new(RacingRepo::new(winner.clone()));

        let (session, created) = service
            .get_or_create_session(NewSession::new("abc123"))
            .await
            .unwrap();

        assert!(!created);
        assert_eq!(session.id, winner.id);
        assert_eq!(session.session_id, "abc123");
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_id() {
        let service = ChatService::new(UnreachableRepo);
        let err = service
            .create_session(NewSession::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = service
            .create_session(NewSession::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_message_rejects_empty_body() {
        let service = ChatService::new(UnreachableRepo);
        let err = service
            .append_message("abc123", NewMessage::text(Sender::User, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_status_rejects_empty_status() {
        let service = ChatService::new(UnreachableRepo);
        let err = service
            .update_session_status("abc123", "")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
