//! Error types for the intake funnel.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Local state error: {0}")]
    LocalState(#[from] LocalStateError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors raised while opening or migrating a database backend.
///
/// Per-record failures surface as [`PersistError`] instead.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// A failed read or write against the remote store.
///
/// Callers never let either variant interrupt the visitor's flow: failures
/// are logged and turned into non-blocking notifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    /// Network or backend hiccup; the same write may succeed if repeated.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// The store rejected the record (bad shape, constraint, auth).
    #[error("Store rejected the request: {0}")]
    Permanent(String),
}

impl PersistError {
    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Errors that prevent a questionnaire from reaching the submitted state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Session has no identifier; reload the questionnaire to continue")]
    MissingIdentity,
}

/// Errors reading or writing the local session blob.
#[derive(Debug, thiserror::Error)]
pub enum LocalStateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt local state for {scope}: {reason}")]
    Corrupt { scope: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid scope key: {0}")]
    InvalidScope(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
