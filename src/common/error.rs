//! Error types for minits

use crate::common::status::{Status, StatusCode};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Metadata Errors ===
    #[error("Storage group is not set for path: {0}")]
    StorageGroupNotSet(String),

    #[error("Path does not exist: {0}")]
    PathNotExist(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Unsupported plan: {0}")]
    UnsupportedPlan(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Unknown log type: {0}")]
    UnknownLogType(String),

    // === Consistency Errors ===
    #[error("Consistency check failed: {0}")]
    ConsistencyFailure(String),

    #[error("No leader in the meta group")]
    NoLeader,

    // === Execution Errors ===
    #[error("Query error ({code}): {message}")]
    Query { code: i32, message: String },

    #[error("Change membership failed: {0}")]
    ChangeMembership(String),

    // === Network Errors ===
    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::Transport(_)
                | Error::NoLeader
                | Error::StorageGroupNotSet(_)
                | Error::ConsistencyFailure(_)
        )
    }

    /// Status code reported to clients for this error.
    pub fn status_code(&self) -> i32 {
        match self {
            Error::Query { code, .. } => *code,
            Error::StorageGroupNotSet(_) => StatusCode::StorageGroupNotExist.code(),
            Error::PathNotExist(_) => StatusCode::TimeseriesNotExist.code(),
            Error::Metadata(_) | Error::UnknownLogType(_) => StatusCode::MetadataError.code(),
            Error::UnsupportedPlan(_) => StatusCode::UnsupportedOperation.code(),
            Error::ConsistencyFailure(_) => StatusCode::ConsistencyFailure.code(),
            Error::NoLeader => StatusCode::NoLeader.code(),
            Error::Timeout(_) => StatusCode::TimeOut.code(),
            Error::InvalidPlan(_) | Error::Transport(_) | Error::HttpClient(_) => {
                StatusCode::ExecuteStatementError.code()
            }
            _ => StatusCode::InternalServerError.code(),
        }
    }

    /// Convert to a wire status
    pub fn to_status(&self) -> Status {
        match self {
            Error::Query { code, message } => Status::new(*code, message.clone()),
            _ => Status::new(self.status_code(), self.to_string()),
        }
    }

    /// Convert to HTTP status code
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::PathNotExist(_) => StatusCode::NOT_FOUND,
            Error::InvalidConfig(_)
            | Error::Serde(_)
            | Error::UnsupportedPlan(_)
            | Error::InvalidPlan(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            Error::NoLeader | Error::ConsistencyFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
