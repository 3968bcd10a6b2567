use thiserror::Error;

/// Failure talking to the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed row: {0}")]
    MalformedRow(String),
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by a scan cycle or at startup.
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to load type prefixes: {0}")]
    RuleLoad(#[source] StoreError),
    #[error("directory enumeration failed at {path}: {message}")]
    Enumeration { path: String, message: String },
    #[error("existence check failed for {path}: {source}")]
    ExistenceCheck {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("walker task failed: {0}")]
    Walker(String),
}
