//! SQLite session repository implementation.
//!
//! Implements `SessionRepository` from `chatkeep-core` using sqlx with
//! split read/write pools: raw queries, private Row structs, RFC 3339 text
//! timestamps. All sqlx errors are classified in `map_sqlx_err`.

use chatkeep_core::store::repository::SessionRepository;
use chatkeep_types::chat::{
    ChatMessage, ChatSession, NewMessage, NewSession, Sender, STATUS_ACTIVE,
};
use chatkeep_types::error::StoreError;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `SessionRepository`.
pub struct SqliteSessionRepository {
    pool: DatabasePool,
}

impl SqliteSessionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

/// Internal row type for mapping SQLite rows to domain ChatSession.
struct SessionRow {
    id: i64,
    session_id: String,
    user_id: Option<i64>,
    email: Option<String>,
    name: Option<String>,
    browser_fingerprint: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    status: String,
    metadata: Option<String>,
    created_at: String,
    updated_at: String,
    last_message_at: Option<String>,
}

impl SessionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            browser_fingerprint: row.try_get("browser_fingerprint")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            status: row.try_get("status")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            last_message_at: row.try_get("last_message_at")?,
        })
    }

    fn into_session(self) -> Result<ChatSession, StoreError> {
        let created_at = parse_datetime(&self.created_at)?;
        let updated_at = parse_datetime(&self.updated_at)?;
        let last_message_at = self
            .last_message_at
            .as_deref()
            .map(parse_datetime)
            .transpose()?;
        let metadata = parse_metadata(self.metadata.as_deref())?;

        Ok(ChatSession {
            id: self.id,
            session_id: self.session_id,
            user_id: self.user_id,
            email: self.email,
            name: self.name,
            browser_fingerprint: self.browser_fingerprint,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            status: self.status,
            metadata,
            created_at,
            updated_at,
            last_message_at,
        })
    }
}

/// Internal row type for mapping SQLite rows to domain ChatMessage.
struct MessageRow {
    id: i64,
    session_id: String,
    message: String,
    sender: String,
    message_type: String,
    intent: Option<String>,
    confidence: Option<f64>,
    source: Option<String>,
    metadata: Option<String>,
    created_at: String,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            message: row.try_get("message")?,
            sender: row.try_get("sender")?,
            message_type: row.try_get("message_type")?,
            intent: row.try_get("intent")?,
            confidence: row.try_get("confidence")?,
            source: row.try_get("source")?,
            metadata: row.try_get("metadata")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_message(self) -> Result<ChatMessage, StoreError> {
        let sender: Sender = self
            .sender
            .parse()
            .map_err(|e: String| StoreError::Query(e))?;
        let created_at = parse_datetime(&self.created_at)?;
        let metadata = parse_metadata(self.metadata.as_deref())?;

        Ok(ChatMessage {
            id: self.id,
            session_id: self.session_id,
            message: self.message,
            sender,
            message_type: self.message_type,
            intent: self.intent,
            confidence: self.confidence,
            source: self.source,
            metadata,
            created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_metadata(s: Option<&str>) -> Result<Option<serde_json::Value>, StoreError> {
    s.map(serde_json::from_str)
        .transpose()
        .map_err(|e| StoreError::Query(format!("invalid metadata JSON: {e}")))
}

fn metadata_json(metadata: &Option<serde_json::Value>) -> Result<Option<String>, StoreError> {
    metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::Query(format!("unserializable metadata: {e}")))
}

/// Classify a sqlx error into the store taxonomy.
///
/// Unique violations become `DuplicateKey`, other constraint failures
/// `ConstraintViolation`, busy/pool/IO trouble `Transient`, everything
/// else `Query`.
fn map_sqlx_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(db) if db.message().contains("UNIQUE") => {
            StoreError::DuplicateKey(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.message().contains("FOREIGN KEY") => {
            StoreError::ConstraintViolation(db.message().to_string())
        }
        // SQLITE_BUSY surfaces as a database error once the busy timeout
        // expires; it is retryable, not a query failure.
        sqlx::Error::Database(db)
            if db.code().as_deref() == Some("5")
                || db.message().contains("database is locked") =>
        {
            StoreError::Transient(db.message().to_string())
        }
        e @ (sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)) => StoreError::Transient(e.to_string()),
        other => StoreError::Query(other.to_string()),
    }
}

fn push_page_clause(sql: &mut String, limit: Option<i64>, offset: Option<i64>) {
    // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
    if limit.is_some() || offset.is_some() {
        sql.push_str(&format!(" LIMIT {}", limit.unwrap_or(-1)));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
}

// ---------------------------------------------------------------------------
// SessionRepository implementation
// ---------------------------------------------------------------------------

impl SessionRepository for SqliteSessionRepository {
    async fn insert_session(
        &self,
        draft: &NewSession,
        now: DateTime<Utc>,
    ) -> Result<ChatSession, StoreError> {
        let metadata = metadata_json(&draft.metadata)?;

        let result = sqlx::query(
            r#"INSERT INTO chat_sessions (session_id, user_id, email, name, browser_fingerprint, ip_address, user_agent, status, metadata, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&draft.session_id)
        .bind(draft.user_id)
        .bind(&draft.email)
        .bind(&draft.name)
        .bind(&draft.browser_fingerprint)
        .bind(&draft.ip_address)
        .bind(&draft.user_agent)
        .bind(STATUS_ACTIVE)
        .bind(&metadata)
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_err)?;

        Ok(ChatSession {
            id: result.last_insert_rowid(),
            session_id: draft.session_id.clone(),
            user_id: draft.user_id,
            email: draft.email.clone(),
            name: draft.name.clone(),
            browser_fingerprint: draft.browser_fingerprint.clone(),
            ip_address: draft.ip_address.clone(),
            user_agent: draft.user_agent.clone(),
            status: STATUS_ACTIVE.to_string(),
            metadata: draft.metadata.clone(),
            created_at: now,
            updated_at: now,
            last_message_at: None,
        })
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM chat_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(map_sqlx_err)?;

        match row {
            Some(row) => {
                let session_row = SessionRow::from_row(&row).map_err(map_sqlx_err)?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE chat_sessions SET status = ?, updated_at = ? WHERE session_id = ?")
                .bind(status)
                .bind(format_datetime(&now))
                .bind(session_id)
                .execute(&self.pool.writer)
                .await
                .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn touch_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET status = ?, updated_at = ? WHERE session_id = ?",
        )
        .bind(STATUS_ACTIVE)
        .bind(format_datetime(&now))
        .bind(session_id)
        .execute(&self.pool.writer)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool.writer)
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn list_sessions(
        &self,
        status: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatSession>, StoreError> {
        let mut sql = String::from("SELECT * FROM chat_sessions");
        if status.is_some() {
            sql.push_str(" WHERE status = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC");
        push_page_clause(&mut sql, limit, offset);

        let mut query = sqlx::query(&sql);
        if let Some(status) = status {
            query = query.bind(status);
        }

        let rows = query
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_err)?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in &rows {
            let session_row = SessionRow::from_row(row).map_err(map_sqlx_err)?;
            sessions.push(session_row.into_session()?);
        }

        Ok(sessions)
    }

    async fn find_latest_by_email(&self, email: &str) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM chat_sessions WHERE email = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => {
                let session_row = SessionRow::from_row(&row).map_err(map_sqlx_err)?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn find_latest_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<ChatSession>, StoreError> {
        let row = sqlx::query(
            r#"SELECT * FROM chat_sessions
               WHERE browser_fingerprint = ? AND email IS NOT NULL
               ORDER BY created_at DESC, id DESC LIMIT 1"#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(map_sqlx_err)?;

        match row {
            Some(row) => {
                let session_row = SessionRow::from_row(&row).map_err(map_sqlx_err)?;
                Ok(Some(session_row.into_session()?))
            }
            None => Ok(None),
        }
    }

    async fn insert_message(
        &self,
        session_id: &str,
        draft: &NewMessage,
        now: DateTime<Utc>,
    ) -> Result<ChatMessage, StoreError> {
        let metadata = metadata_json(&draft.metadata)?;

        // Both writes commit together: a reader never sees the message
        // without the parent's last_message_at reflecting it.
        let mut tx = self.pool.writer.begin().await.map_err(map_sqlx_err)?;

        let updated = sqlx::query(
            "UPDATE chat_sessions SET last_message_at = ?, updated_at = ? WHERE session_id = ?",
        )
        .bind(format_datetime(&now))
        .bind(format_datetime(&now))
        .bind(session_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if updated.rows_affected() == 0 {
            // Dropping the transaction rolls back; mirrors the FK check.
            return Err(StoreError::NotFound);
        }

        let result = sqlx::query(
            r#"INSERT INTO chat_messages (session_id, message, sender, message_type, intent, confidence, source, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(session_id)
        .bind(&draft.message)
        .bind(draft.sender.to_string())
        .bind(&draft.message_type)
        .bind(&draft.intent)
        .bind(draft.confidence)
        .bind(&draft.source)
        .bind(&metadata)
        .bind(format_datetime(&now))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(ChatMessage {
            id: result.last_insert_rowid(),
            session_id: session_id.to_string(),
            message: draft.message.clone(),
            sender: draft.sender,
            message_type: draft.message_type.clone(),
            intent: draft.intent.clone(),
            confidence: draft.confidence,
            source: draft.source.clone(),
            metadata: draft.metadata.clone(),
            created_at: now,
        })
    }

    async fn list_messages(
        &self,
        session_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let mut sql = String::from(
            "SELECT * FROM chat_messages WHERE session_id = ? ORDER BY created_at ASC, id ASC",
        );
        push_page_clause(&mut sql, limit, offset);

        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(map_sqlx_err)?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in &rows {
            let msg_row = MessageRow::from_row(row).map_err(map_sqlx_err)?;
            messages.push(msg_row.into_message()?);
        }

        Ok(messages)
    }

    async fn count_messages(&self, session_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM chat_messages WHERE session_id = ?")
            .bind(session_id)
            .fetch_one(&self.pool.reader)
            .await
            .map_err(map_sqlx_err)?;

        let count: i64 = row.try_get("cnt").map_err(map_sqlx_err)?;

        Ok(count as u64)
    }
}
