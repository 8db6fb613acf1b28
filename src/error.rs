// src/error.rs - Buffer error handling
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main buffer error type
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferError {
    // Position errors
    #[error("Position {pos} is out of range (size: {size})")]
    OutOfRange { pos: u64, size: u64 },

    // Storage errors
    #[error("Storage exhausted while growing to {requested} bytes: {reason}")]
    StorageExhausted { requested: u64, reason: String },

    // I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    // Cache errors
    #[error("Invalid cache key: {key:?}")]
    InvalidKey { key: String },

    // Request body errors
    #[error("Body too large: {size} bytes (max: {limit})")]
    BodyTooLarge { size: u64, limit: u64 },

    // Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

/// Result type alias for buffer operations
pub type Result<T> = std::result::Result<T, BufferError>;

impl BufferError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            BufferError::OutOfRange { .. } => ErrorCategory::Range,
            BufferError::StorageExhausted { .. } => ErrorCategory::Storage,
            BufferError::Io { .. } => ErrorCategory::Io,
            BufferError::InvalidKey { .. } => ErrorCategory::Cache,
            BufferError::BodyTooLarge { .. } => ErrorCategory::Body,
            BufferError::ConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    /// Check if the caller can reasonably retry, e.g. with a smaller
    /// allocation or after freeing disk space.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BufferError::StorageExhausted { .. } | BufferError::Io { .. })
    }

    /// Get the log level for this error
    pub fn log_level(&self) -> LogLevel {
        match self {
            BufferError::Io { .. } | BufferError::ConfigError { .. } => LogLevel::Error,
            BufferError::StorageExhausted { .. } => LogLevel::Warn,
            BufferError::BodyTooLarge { .. } | BufferError::InvalidKey { .. } => LogLevel::Info,
            BufferError::OutOfRange { .. } => LogLevel::Debug,
        }
    }

    /// Emit this error through `tracing` at its configured level.
    pub fn log(&self) {
        match self.log_level() {
            LogLevel::Error => tracing::error!(category = ?self.category(), "{}", self),
            LogLevel::Warn => tracing::warn!(category = ?self.category(), "{}", self),
            LogLevel::Info => tracing::info!(category = ?self.category(), "{}", self),
            LogLevel::Debug => tracing::debug!(category = ?self.category(), "{}", self),
        }
    }

    /// A buffer whose storage ended at `pos` although it reports `size`
    /// bytes.
    pub(crate) fn truncated(pos: u64, size: u64) -> Self {
        BufferError::Io {
            message: format!("buffer yielded no data at {} of {} bytes", pos, size),
        }
    }

    pub(crate) fn exhausted<S: Into<String>>(requested: u64, reason: S) -> Self {
        BufferError::StorageExhausted {
            requested,
            reason: reason.into(),
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Range,
    Storage,
    Io,
    Cache,
    Body,
    Configuration,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl From<std::io::Error> for BufferError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull
            | std::io::ErrorKind::OutOfMemory
            | std::io::ErrorKind::FileTooLarge => BufferError::StorageExhausted {
                requested: 0,
                reason: err.to_string(),
            },
            _ => BufferError::Io {
                message: err.to_string(),
            },
        }
    }
}
