use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Failures of the Keel record store.
///
/// redb's error types are flattened to strings; the variant says which
/// stage of a transaction failed.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open state store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Encode(String),

    #[error("failed to decode record: {0}")]
    Decode(String),

    /// A record referenced by a write does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
}
