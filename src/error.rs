//! Error types for Strata

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache subsystem and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Backing Store Errors
    // =========================================================================
    /// Backing store could not be reached or rejected the call
    #[error("Backing store unavailable: {0}")]
    BackingStoreUnavailable(String),

    /// Backing store call exceeded its deadline
    #[error("Backing store {operation} timed out after {timeout:?}")]
    BackingStoreTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Backing store rejected a write because of an unexpected shape
    #[error("Schema mismatch for {kind} updates: {reason}")]
    SchemaMismatch { kind: String, reason: String },

    /// Database driver error
    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // =========================================================================
    // Data Errors
    // =========================================================================
    /// A pending update failed normalization
    #[error("Validation failed for field '{field}': {reason}")]
    ValidationFailure { field: String, reason: String },

    /// A field outside the compact subset was requested from a partial record
    #[error("Record {id} is partial; field '{field}' is not available")]
    PartialRecord { id: String, field: String },

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file: {0}")]
    ConfigFile(#[from] serde_yaml::Error),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a write that failed with this error may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::BackingStoreUnavailable(_) | Error::BackingStoreTimeout { .. } => true,
            #[cfg(feature = "postgres")]
            Error::Database(_) => true,
            _ => false,
        }
    }
}
