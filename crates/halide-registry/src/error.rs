//! Error types for the identity registry.

use thiserror::Error;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur in registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No row matches the lookup key.
    #[error("node not found: {0}")]
    NotFound(String),

    /// SQLite store failure, passed through unchanged.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Stored labels could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Random generation or hashing failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A thread panicked while holding the store lock.
    #[error("store lock poisoned")]
    Poisoned,
}

impl RegistryError {
    /// Returns true for absent lookups
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
