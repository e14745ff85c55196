//! Error types shared across the PM file sync crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, PmSyncError>;

/// Main error type for shared concerns
#[derive(Error, Debug)]
pub enum PmSyncError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PmSyncError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
