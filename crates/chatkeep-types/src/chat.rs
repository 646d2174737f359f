//! Chat session and message types for Chatkeep.
//!
//! A session is one logical conversation, identified by a stable external
//! string id. Messages are individual turns within a session, immutable
//! once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Who authored a chat message.
///
/// Stored as lowercase text in the `sender` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
    Bot,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Agent => write!(f, "agent"),
            Sender::Bot => write!(f, "bot"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "agent" => Ok(Sender::Agent),
            "bot" => Ok(Sender::Bot),
            other => Err(format!("invalid sender: '{other}'")),
        }
    }
}

/// Default lifecycle status assigned to new sessions.
pub const STATUS_ACTIVE: &str = "active";

/// Default message type for messages that don't specify one.
pub const MESSAGE_TYPE_TEXT: &str = "text";

/// A persisted chat session.
///
/// `id` is an internal surrogate; `session_id` is the externally-visible
/// identifier and the key messages reference. `last_message_at` tracks the
/// `created_at` of the newest message in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: i64,
    pub session_id: String,
    /// Opaque reference to an external user entity; never validated here.
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub browser_fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Free-form lifecycle marker, `"active"` on creation.
    pub status: String,
    /// Opaque structured payload with no enforced internal schema.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A single persisted message within a session.
///
/// Messages are append-only: no field changes after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub message: String,
    pub sender: Sender,
    pub message_type: String,
    /// Classified intent (annotation only, opaque to persistence).
    pub intent: Option<String>,
    /// Classifier confidence for `intent`.
    pub confidence: Option<f64>,
    /// Which subsystem produced the message (annotation only).
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for creating a session.
///
/// Everything except `session_id` is optional; timestamps and status are
/// assigned by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    pub user_id: Option<i64>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub browser_fingerprint: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewSession {
    /// Create a draft session with only the external id set.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }
}

/// Caller-supplied fields for appending a message.
///
/// `message_type` defaults to `"text"`; the annotation fields are optional
/// and opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessage {
    pub sender: Sender,
    pub message: String,
    pub message_type: String,
    pub intent: Option<String>,
    pub confidence: Option<f64>,
    pub source: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl NewMessage {
    /// Create a plain text message draft with no annotations.
    pub fn text(sender: Sender, message: impl Into<String>) -> Self {
        Self {
            sender,
            message: message.into(),
            message_type: MESSAGE_TYPE_TEXT.to_string(),
            intent: None,
            confidence: None,
            source: None,
            metadata: None,
        }
    }
}

/// Contact details recovered from a visitor's previous sessions.
///
/// Produced by the returning-user lookup (by email, falling back to
/// browser fingerprint) and used to prefill new sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturningUser {
    pub email: Option<String>,
    pub name: Option<String>,
}
