//! Error types for tinify-client.
//!
//! Every failure that comes back from the remote service is folded into one
//! of four kinds:
//!
//! | Status             | Kind         |
//! |--------------------|--------------|
//! | 401, 429           | Account      |
//! | other 400–499      | Client       |
//! | 500–599            | Server       |
//! | anything else      | Connection   |
//!
//! Transport failures (timeouts, DNS, socket, TLS) are always `Connection`.
//! The remaining variants are raised by the client itself before or after a
//! request (file I/O, descriptor validation, disposed handles).

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Broad error category, for callers that want to match on kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad credentials or exhausted quota.
    Account,
    /// Malformed request.
    Client,
    /// Remote-side fault.
    Server,
    /// Transport-level failure or an unexpected status.
    Connection,
    /// Raised locally, never by the remote service.
    Local,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Account => "account",
            ErrorKind::Client => "client",
            ErrorKind::Server => "server",
            ErrorKind::Connection => "connection",
            ErrorKind::Local => "local",
        };
        f.write_str(name)
    }
}

/// Main error type for all tinify-client operations.
#[derive(Debug, Error)]
pub enum TinifyError {
    /// Credentials rejected (401) or monthly limit reached (429).
    #[error("{message} (HTTP {status}/{error_type})")]
    Account {
        message: String,
        error_type: String,
        status: u16,
    },

    /// Any other 4xx response.
    #[error("{message} (HTTP {status}/{error_type})")]
    Client {
        message: String,
        error_type: String,
        status: u16,
    },

    /// 5xx response after the retry budget was spent.
    #[error("{message} (HTTP {status}/{error_type})")]
    Server {
        message: String,
        error_type: String,
        status: u16,
    },

    /// Transport failure, or a non-2xx status outside 400–599.
    #[error("{message}")]
    Connection {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O error while reading an upload or writing a result.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error for a request body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transform descriptor failed validation.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Client construction failed (missing key, bad endpoint, bad trust bundle).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The image handle or result was already disposed.
    #[error("Image has been disposed")]
    Disposed,

    /// Destination slice shorter than the buffered image.
    #[error("Destination buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Result type alias using TinifyError.
pub type Result<T> = std::result::Result<T, TinifyError>;

/// Error payload returned by the service on non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct ErrorData {
    pub message: String,
    pub error: String,
}

impl ErrorData {
    /// Parse an error body, folding parse failures into a `ParseError` payload.
    pub(crate) fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<ErrorData>(body) {
            Ok(data) => data,
            Err(e) => ErrorData {
                message: format!("Error while parsing response: {}", e),
                error: "ParseError".to_string(),
            },
        }
    }
}

impl TinifyError {
    /// Classify an HTTP status and error payload into a typed error.
    pub fn from_status(status: u16, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        let message = message.into();
        let error_type = error_type.into();
        match status {
            401 | 429 => TinifyError::Account {
                message,
                error_type,
                status,
            },
            400..=499 => TinifyError::Client {
                message,
                error_type,
                status,
            },
            500..=599 => TinifyError::Server {
                message,
                error_type,
                status,
            },
            _ => TinifyError::Connection {
                message: format!("{} (HTTP {}/{})", message, status, error_type),
                status: Some(status),
                source: None,
            },
        }
    }

    /// Connection failure with no underlying cause.
    pub fn connection(message: impl Into<String>) -> Self {
        TinifyError::Connection {
            message: message.into(),
            status: None,
            source: None,
        }
    }

    /// Error kind for coarse matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TinifyError::Account { .. } => ErrorKind::Account,
            TinifyError::Client { .. } => ErrorKind::Client,
            TinifyError::Server { .. } => ErrorKind::Server,
            TinifyError::Connection { .. } => ErrorKind::Connection,
            _ => ErrorKind::Local,
        }
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            TinifyError::Account { status, .. }
            | TinifyError::Client { status, .. }
            | TinifyError::Server { status, .. } => Some(*status),
            TinifyError::Connection { status, .. } => *status,
            _ => None,
        }
    }

    /// Machine error token from the service payload (`"ParseError"` if unparseable).
    pub fn error_type(&self) -> Option<&str> {
        match self {
            TinifyError::Account { error_type, .. }
            | TinifyError::Client { error_type, .. }
            | TinifyError::Server { error_type, .. } => Some(error_type),
            _ => None,
        }
    }

    /// Whether a caller might reasonably retry the whole operation later.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Server | ErrorKind::Connection)
    }
}
