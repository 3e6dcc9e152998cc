use thiserror::Error;

use crate::outcome::{classify, Outcome};

/// Result type alias for cluster protocol operations
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur while talking to the Portal
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Join token or client credentials were rejected (401/403)
    #[error("portal rejected credentials (status {status})")]
    Unauthorized {
        /// HTTP status code, 401 or 403
        status: u16,
    },

    /// Endpoint or resource does not exist (404)
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the resource that wasn't found
        resource: String,
    },

    /// Portal asked us to slow down (429)
    #[error("rate limited by portal")]
    RateLimited,

    /// Request was malformed or conflicts with existing state (400/409)
    #[error("request rejected ({code}): {message}")]
    Rejected {
        /// HTTP status code
        code: u16,
        /// Error message from the Portal
        message: String,
    },

    /// Any other unexpected status
    #[error("portal error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from the Portal
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Request timed out
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response body exceeded the accepted size
    #[error("response exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Maximum accepted size in bytes
        limit: u64,
    },

    /// Invalid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClusterError {
    /// Build the error for a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            404 => Self::NotFound { resource: message },
            429 => Self::RateLimited,
            400 | 409 => Self::Rejected {
                code: status,
                message,
            },
            _ => Self::Api {
                code: status,
                message,
            },
        }
    }

    /// How the registration loop should react to this error.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Http(_) | Self::Timeout(_) | Self::Connection(_) => Outcome::Retry,
            Self::Json(_)
            | Self::PayloadTooLarge { .. }
            | Self::InvalidUrl(_)
            | Self::Config(_) => Outcome::Terminal,
            other => other.status_code().map_or(Outcome::Terminal, classify),
        }
    }

    /// Returns true if the error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.outcome() == Outcome::Retry
    }

    /// Returns true if the error is due to authentication
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns the HTTP status code if the Portal answered
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { status } => Some(*status),
            Self::RateLimited => Some(429),
            Self::NotFound { .. } => Some(404),
            Self::Rejected { code, .. } | Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}
