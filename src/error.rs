//! Custom error types for bizloop.
//!
//! This module provides structured error types that separate startup
//! failures (bad configuration) from per-iteration failures (task queue,
//! model calls) so the binary can decide whether to abort or continue.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bizloop operations
#[derive(Error, Debug)]
pub enum BizloopError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Iteration Errors
    // =========================================================================
    /// Caller handed the scheduler input that validated configuration
    /// should have made impossible
    #[error("Invariant violation: {message}")]
    InvariantViolation { message: String },

    /// Task queue operation failed
    #[error("Task queue error: {message}")]
    Queue { message: String },

    /// No task with the given id
    #[error("Unknown task: {id}")]
    UnknownTask { id: String },

    // =========================================================================
    // Model Errors
    // =========================================================================
    /// Model backend call failed
    #[error("Model call failed: {message}")]
    Model { message: String },

    /// Model endpoint timed out
    #[error("Model request timed out after {timeout_secs}s")]
    ModelTimeout { timeout_secs: u64 },

    /// Missing required tool
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BizloopError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create an invalid configuration error for a single field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invariant violation
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create a task queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::Model {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable (the loop may try the next iteration)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Model { .. } | Self::ModelTimeout { .. } | Self::Queue { .. }
        )
    }

    /// Check if this error is fatal (the loop must not start or continue)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidConfig { .. }
                | Self::MissingFile { .. }
                | Self::MissingTool { .. }
                | Self::InvariantViolation { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvariantViolation { .. } => 3,
            Self::Model { .. } | Self::ModelTimeout { .. } => 4,
            Self::MissingFile { .. } | Self::MissingTool { .. } => 6,
            Self::Config { .. } | Self::InvalidConfig { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for bizloop results
pub type Result<T> = std::result::Result<T, BizloopError>;

/// Extension trait for converting foreign errors to [`BizloopError`]
pub trait IntoBizloopError<T> {
    fn into_bizloop_config(self) -> Result<T>;
    fn into_bizloop_model(self) -> Result<T>;
}

impl<T, E: Into<anyhow::Error>> IntoBizloopError<T> for std::result::Result<T, E> {
    fn into_bizloop_config(self) -> Result<T> {
        self.map_err(|e| BizloopError::config(e.into().to_string()))
    }

    fn into_bizloop_model(self) -> Result<T> {
        self.map_err(|e| BizloopError::model(e.into().to_string()))
    }
}
