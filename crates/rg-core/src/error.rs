//! # AppError
//!
//! Centralized error handling for the Rusty-Gallery core.
//! Maps feed, storage, and decoding failures to actionable error types.

use thiserror::Error;

/// The primary error type for all rg-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Connectivity or transport failure (DNS, refused connection, timeout)
    #[error("network error: {message}")]
    Network {
        message: String,
        code: Option<String>,
    },

    /// 4xx/5xx answer from the remote endpoint
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// The request was superseded by a newer one or torn down.
    #[error("request cancelled")]
    Cancelled,

    /// Persistence read/write failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed cached or remote payload
    #[error("parse error: {0}")]
    Parse(String),

    /// Resource not found (e.g., Image in a window, cached entry)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., page size out of range)
    #[error("validation error: {0}")]
    Validation(String),

    /// Invalid or missing configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// HTTP status of the failure, when the remote endpoint answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport error code, when the client reported one.
    pub fn code(&self) -> Option<&str> {
        match self {
            AppError::Network { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }

    /// Stable message shown to the user for a failed feed load.
    ///
    /// Categories win over the raw message; only uncategorised failures
    /// fall through to their own text.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Cancelled => "Request was cancelled".to_string(),
            AppError::Network { .. } => "Please check your internet connection".to_string(),
            AppError::Http { status: 429, .. } => {
                "Too many requests. Please try again later".to_string()
            }
            AppError::Http { status, .. } if *status >= 500 => {
                "Server error. Please try again later".to_string()
            }
            AppError::Http { status: 404, .. } => "Images not found".to_string(),
            AppError::Http { message, .. } if !message.is_empty() => message.clone(),
            AppError::Http { .. } => "Something went wrong".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

/// A specialized Result type for Rusty-Gallery logic.
pub type Result<T> = std::result::Result<T, AppError>;
