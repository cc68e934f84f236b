use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to callers of the bridge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("Health data is not available on this platform")]
    DataUnavailable,

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Health store is not initialised. Call requestPermissions first.")]
    NotInitialized,

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("The query returned unexpected results: {0}")]
    UnexpectedResultShape(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    pub fn query_failed(detail: impl Into<String>) -> Self {
        Self::QueryFailed(detail.into())
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument(detail.into())
    }

    /// Stable kind name, used as the rejection code on the JSON boundary.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DataUnavailable => "DataUnavailable",
            Self::AuthorizationFailed(_) => "AuthorizationFailed",
            Self::NotInitialized => "NotInitialized",
            Self::QueryFailed(_) => "QueryFailed",
            Self::UnexpectedResultShape(_) => "UnexpectedResultShape",
            Self::InvalidArgument(_) => "InvalidArgument",
        }
    }
}

/// Errors raised by a [`crate::store::HealthStore`] implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Denied(String),

    #[error("{0}")]
    Other(String),
}

impl StoreError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// A rejected bridge call, as handed back across the JSON boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub code: &'static str,
    pub message: String,
}

impl From<HealthError> for Rejection {
    fn from(err: HealthError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}
