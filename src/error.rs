use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    /// A collaborator reference or option does not satisfy its contract.
    /// Raised while constructing a task, never stored in its status.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// A serialized task document is malformed or inconsistent.
    #[error("State error: {0}")]
    State(String),

    #[error("Job store error: {0}")]
    JobStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, ImportError>;
