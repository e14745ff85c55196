//! Server-specific error types

use thiserror::Error;

use crate::ingest::event::EventError;
use crate::ingest::repository::RepositoryError;
use crate::ingest::transport::TransportError;

/// Result type alias for one pass through the ingest pipeline
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Failures that escape one processing attempt of a message
///
/// Only the transient kinds are retried by the dispatcher; a malformed
/// envelope fails the same way on every attempt.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed event: {0}")]
    MalformedEvent(#[from] EventError),

    #[error("Repository failure while ingesting '{location}': {source}")]
    Repository {
        location: String,
        #[source]
        source: RepositoryError,
    },

    #[error("Failed to list files at '{location}': {source}")]
    Transport {
        location: String,
        #[source]
        source: TransportError,
    },
}

impl PipelineError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::Repository { .. } | PipelineError::Transport { .. }
        )
    }
}
