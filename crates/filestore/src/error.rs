//! Error types for filestore operations

use crate::wire::Action;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilestoreError {
    #[error("Invalid host {0:?}: expected an <instance>.azuredatabricks.net address")]
    InvalidHost(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error during {action}: {source}")]
    Transport {
        action: &'static str,
        /// Whether the request may have reached the server
        delivered: bool,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("HTTP {status} from {action}: {code} {message}")]
    Http {
        action: &'static str,
        status: u16,
        code: String,
        message: String,
    },

    #[error("Malformed {action} response: {detail}")]
    Protocol { action: &'static str, detail: String },

    #[error("Remote path not found: {0}")]
    NotFound(String),

    #[error("No _SUCCESS marker in {folder}: partitioned output is incomplete")]
    Incomplete { folder: String },

    #[error("Upload to {path} aborted after {rows_sent} rows: {source}")]
    PartialUpload {
        path: String,
        rows_sent: usize,
        #[source]
        source: Box<FilestoreError>,
    },

    #[error("{what} encodes to {encoded} bytes, above the {ceiling} byte chunk ceiling")]
    RowTooLarge {
        /// `header` or `row <n>`
        what: String,
        encoded: usize,
        ceiling: usize,
    },

    #[error("Part {part} has columns {found:?}, expected {expected:?}")]
    SchemaMismatch {
        part: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Column {column} has unsupported type {data_type}")]
    UnsupportedColumnType { column: String, data_type: String },

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl FilestoreError {
    /// A failure after the request may have been sent, e.g. a lost reply.
    pub fn transport<E>(action: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FilestoreError::Transport {
            action,
            delivered: true,
            source: source.into(),
        }
    }

    /// A failure before the request reached the server, e.g. connection refused.
    pub fn undelivered<E>(action: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        FilestoreError::Transport {
            action,
            delivered: false,
            source: source.into(),
        }
    }

    pub fn protocol(action: &'static str, detail: impl Into<String>) -> Self {
        FilestoreError::Protocol {
            action,
            detail: detail.into(),
        }
    }

    /// Whether repeating the same request may succeed.
    ///
    /// Connection-level failures, throttling and server-side errors qualify.
    /// Client errors, malformed responses and local failures do not.
    pub fn is_transient(&self) -> bool {
        match self {
            FilestoreError::Transport { .. } => true,
            FilestoreError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether `action` may be sent again after this error.
    ///
    /// Appends and closes change state on every call, so they are repeated
    /// only when the server provably did not process the first attempt.
    pub fn is_retryable(&self, action: Action) -> bool {
        if action.is_idempotent() {
            return self.is_transient();
        }
        match self {
            FilestoreError::Transport { delivered, .. } => !delivered,
            FilestoreError::Http { status, .. } => *status == 429,
            _ => false,
        }
    }
}
