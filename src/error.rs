//! Unified error types for memsearch.
//!
//! Provider failures are recoverable in the coordination layer:
//! a failing primary is replaced by its fallback, a declining provider is
//! skipped. Only the "nothing could be constructed" case reaches the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for memsearch operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// I/O errors from workspace or config file operations.
    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Provider call failures (search, read, sync).
    #[error("backend error: {message}")]
    Backend { message: String },

    /// JSON or TOML parsing/serialization errors.
    #[error("serialization error: {message}")]
    Serde { message: String },

    /// Configuration loading or resolution errors.
    #[error("config error: {message}")]
    Config { message: String },

    /// A subprocess call exceeded its wall-clock budget and was killed.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A subprocess exited unsuccessfully or answered with garbage.
    #[error("{message}")]
    Process { message: String },

    /// No provider (not even the built-in one) could serve the request.
    #[error("memory search unavailable: {message}")]
    Unavailable { message: String },
}

/// A specialized Result type for memsearch operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Create a storage error from an I/O error.
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serde(message: impl Into<String>) -> Self {
        Self::Serde {
            message: message.into(),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error for a subprocess operation.
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a process error.
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Whether this error came from the external process rather than from
    /// local bookkeeping.
    pub fn is_process_failure(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Process { .. })
    }
}

impl From<io::Error> for MemoryError {
    fn from(err: io::Error) -> Self {
        Self::Storage {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde {
            message: err.to_string(),
        }
    }
}

/// Trait for fail-open error handling.
///
/// Log the error and continue with a safe default instead of propagating.
pub trait FailOpen<T> {
    /// Handle an error by logging a warning and returning the default value.
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default;

    /// Handle an error by logging a warning and returning the provided fallback.
    fn fail_open_with(self, context: &str, fallback: T) -> T;
}

impl<T> FailOpen<T> for Result<T> {
    fn fail_open_default(self, context: &str) -> T
    where
        T: Default,
    {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using default)", context, err);
                T::default()
            }
        }
    }

    fn fail_open_with(self, context: &str, fallback: T) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("{}: {} (fail-open: using fallback)", context, err);
                fallback
            }
        }
    }
}

/// Exit codes for the memsearch CLI.
pub mod exit_codes {
    /// The command completed.
    pub const SUCCESS: i32 = 0;

    /// The command failed (including "no provider available").
    pub const FAILURE: i32 = 1;
}
