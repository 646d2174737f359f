use thiserror::Error;

/// Errors surfaced by the session/message store.
///
/// `NotFound` and `DuplicateKey` are expected, non-fatal outcomes that
/// callers handle as control flow. `Transient` failures may be retried by
/// the caller; the store itself never retries.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("entity not found")]
    NotFound,

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("query error: {0}")]
    Query(String),
}
