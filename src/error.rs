//! Error types for the caching layer
//!
//! This module defines the error taxonomy shared by the backing store
//! client, the cache service, the warming scheduler, and the rate-lookup
//! middleware. A cache miss is never an error; every failure path surfaces
//! as an explicit [`CacheError`].

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Backing store unreachable after bounded retries
    #[error("Connection error: {0}")]
    Connection(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Advisory lock wait exceeded the caller's deadline
    #[error("Lock wait timed out after {waited_ms}ms: {key}")]
    Timeout { key: String, waited_ms: u64 },

    /// A value factory failed
    #[error("Factory error: {0}")]
    Factory(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Redis driver error (wrapper)
    #[error("Redis driver error: {0}")]
    Driver(#[from] redis::RedisError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Whether this error indicates the backing store could not be reached
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CacheError::Connection(_) | CacheError::Driver(_))
    }

    /// Whether this error indicates a malformed payload
    pub fn is_serialization(&self) -> bool {
        matches!(self, CacheError::Serialization(_))
    }

    /// Whether this error indicates a lock wait timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Timeout { .. })
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
