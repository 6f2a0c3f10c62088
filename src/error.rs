//! Error types for kvpage
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! The error is `Clone` so the same value can be handed back to the caller
//! and broadcast to cursor observers.

use crate::pagination::{RemoteError, RemoteErrorKind};
use thiserror::Error;

/// The main error type for kvpage
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ============================================================================
    // Cursor Errors
    // ============================================================================
    #[error("This cursor is closed (attempted {operation})")]
    ClosedCursor { operation: &'static str },

    #[error("No more elements on cursor")]
    Exhausted,

    #[error("No current element: next() has not returned an item yet")]
    NoCurrentItem,

    #[error("{operation} failed with remote {kind} error: {message}")]
    Fetch {
        operation: &'static str,
        kind: RemoteErrorKind,
        message: String,
    },

    // ============================================================================
    // Codec Errors
    // ============================================================================
    #[error("Syntax error at offset {at}: {message}")]
    Syntax {
        message: String,
        at: usize,
        text: String,
    },

    #[error("Invalid stringify argument: {message}")]
    StringifyType { message: String },

    #[error("Failed to decode value: {message}")]
    Decode { message: String },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {message}")]
    Io { message: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a closed cursor error for the given operation
    pub fn closed(operation: &'static str) -> Self {
        Self::ClosedCursor { operation }
    }

    /// Translate a remote failure into a fetch error
    pub fn fetch(operation: &'static str, remote: RemoteError) -> Self {
        Self::Fetch {
            operation,
            kind: remote.kind,
            message: remote.message,
        }
    }

    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, at: usize, text: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
            at,
            text: text.into(),
        }
    }

    /// Create a stringify argument error
    pub fn stringify_type(message: impl Into<String>) -> Self {
        Self::StringifyType {
            message: message.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid config value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Remote error kind, for fetch errors
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Error::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error ends the cursor or stream that produced it
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::ClosedCursor { .. } | Error::Exhausted | Error::Fetch { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config {
            message: format!("Failed to parse YAML: {err}"),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias for kvpage
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
