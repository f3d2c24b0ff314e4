//! Error types for credential acquisition.

use std::path::PathBuf;

/// Errors that can occur while acquiring MFA-backed credentials.
#[derive(Debug, thiserror::Error)]
pub enum MfaError {
    /// Account configuration is unusable (missing fields, bad duration,
    /// wrong number of MFA devices, no token sources).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reading, writing or removing a cache file failed.
    #[error("cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A cache file exists but does not hold a credential record.
    #[error("malformed cache record at {}: {source}", path.display())]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A deadline elapsed before a result was available.
    #[error("timeout waiting for {0}")]
    Timeout(&'static str),

    /// The operation was cancelled before it completed.
    #[error("cancelled")]
    Cancelled,

    /// The identity or token exchange service rejected or failed a call.
    #[error("{operation} failed: {message}")]
    ExternalService {
        operation: &'static str,
        message: String,
    },

    /// The hardware-key helper failed for a reason other than a missing device.
    #[error("hardware key helper failed: {cause}\n{output}")]
    HelperProcess { output: String, cause: String },

    /// The hardware key answered but holds no code for the configured label.
    #[error("no token for label {0:?} on hardware key")]
    NoTokenForLabel(String),

    /// The interactive input stream ended before a code was entered.
    #[error("input closed before an MFA token was entered")]
    InputClosed,

    /// Reading interactive input failed.
    #[error("reading MFA token failed: {0}")]
    Input(#[from] std::io::Error),

    /// A token source task panicked or was aborted.
    #[error("token source task failed: {0}")]
    SourceTask(String),

    /// Every token source finished without producing a code.
    #[error("no token source produced a code: {0}")]
    AllSourcesFailed(Box<MfaError>),
}

impl MfaError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        MfaError::Configuration(message.into())
    }

    /// Create an external service error for the named operation.
    pub fn service(operation: &'static str, e: impl std::fmt::Display) -> Self {
        MfaError::ExternalService {
            operation,
            message: e.to_string(),
        }
    }

    /// Whether the error came from configuration rather than runtime conditions.
    pub fn is_configuration(&self) -> bool {
        matches!(self, MfaError::Configuration(_))
    }
}

/// Convenience type alias for Results using MfaError.
pub type Result<T> = std::result::Result<T, MfaError>;
