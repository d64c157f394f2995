//! Error types for the copy engine.

use thiserror::Error;

/// Main error type for copy operations.
#[derive(Error, Debug)]
pub enum CopyError {
    /// Chunk bounds are impossible (`start > limit`).
    #[error("impossible chunk options (limit ({limit}) must be greater than start ({start}))")]
    Bounds { start: i64, limit: i64 },

    /// The per-chunk verifier asked the run to stop.
    #[error("Verification failed, aborting early")]
    VerificationFailed,

    /// A short insert left a warning that is not a primary key duplicate.
    #[error("Unexpected warning found for inserted row: {0}")]
    UnexpectedWarning(String),

    /// Generic SQL error reported by a connection.
    #[error("{0}")]
    Sql(String),

    /// MySQL driver error
    #[error("{0}")]
    Mysql(#[from] mysql_async::Error),

    /// The connection silently moved to another server.
    #[error("Different MySQL server host than the initial host (initial: {initial}, current: {current})")]
    HostDivergence { initial: String, current: String },

    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by retry rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Bounds,
    Verification,
    UnexpectedWarning,
    Sql,
    HostDivergence,
    Config,
    Io,
}

impl CopyError {
    /// Create a generic SQL error.
    pub fn sql(message: impl Into<String>) -> Self {
        CopyError::Sql(message.into())
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CopyError::Bounds { .. } => ErrorKind::Bounds,
            CopyError::VerificationFailed => ErrorKind::Verification,
            CopyError::UnexpectedWarning(_) => ErrorKind::UnexpectedWarning,
            CopyError::Sql(_) | CopyError::Mysql(_) => ErrorKind::Sql,
            CopyError::HostDivergence { .. } => ErrorKind::HostDivergence,
            CopyError::Config(_) | CopyError::Yaml(_) | CopyError::Json(_) => ErrorKind::Config,
            CopyError::Io(_) => ErrorKind::Io,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for copy operations.
pub type Result<T> = std::result::Result<T, CopyError>;
