//! Per-message processing entry point
//!
//! Every consumed message goes through [`MessageDispatcher::dispatch`]. The
//! dispatcher owns the retry policy and is the only writer of the processing
//! counters.

use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::coordinator::{IngestOutcome, IngestionCoordinator};
use super::event;
use super::metrics::ProcessingCounters;
use super::retry::{retry_with_backoff, RetryPolicy};
use crate::error::{PipelineError, PipelineResult};

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Null or empty payload, dropped without touching the counters
    Empty,
    /// Envelope could not be decoded
    Malformed,
    Processed { locations: usize },
    /// Transient failures outlasted the retry policy
    Exhausted,
}

pub struct MessageDispatcher {
    coordinator: Arc<IngestionCoordinator>,
    counters: Arc<ProcessingCounters>,
    retry: RetryPolicy,
}

impl MessageDispatcher {
    pub fn new(
        coordinator: Arc<IngestionCoordinator>,
        counters: Arc<ProcessingCounters>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            coordinator,
            counters,
            retry,
        }
    }

    pub fn counters(&self) -> &Arc<ProcessingCounters> {
        &self.counters
    }

    /// Process one raw payload consumed from `topic`
    #[instrument(skip(self, payload), fields(correlation_id = tracing::field::Empty))]
    pub async fn dispatch(&self, payload: Option<&[u8]>, topic: &str) -> DispatchOutcome {
        let payload = match payload {
            Some(bytes) if !bytes.iter().all(u8::is_ascii_whitespace) => bytes,
            _ => {
                debug!("Dropping empty message");
                return DispatchOutcome::Empty;
            },
        };

        // Shared by every file of this message, across retries
        let correlation_id = Uuid::new_v4();
        tracing::Span::current().record("correlation_id", tracing::field::display(correlation_id));

        let result = retry_with_backoff(&self.retry, PipelineError::is_transient, |attempt| {
            if attempt > 1 {
                info!(attempt, "Retrying message");
            }
            self.process(payload, correlation_id)
        })
        .await;

        match result {
            Ok(locations) => {
                self.counters.record_processed();
                DispatchOutcome::Processed { locations }
            },
            Err(PipelineError::MalformedEvent(e)) => {
                warn!(error = %e, "Skipping malformed event");
                self.counters.record_error();
                DispatchOutcome::Malformed
            },
            Err(e) => {
                error!(
                    error = %e,
                    attempts = self.retry.max_attempts,
                    "Message processing failed after all retries"
                );
                self.counters.record_error();
                DispatchOutcome::Exhausted
            },
        }
    }

    /// One attempt: decode the envelope and ingest each location in order
    async fn process(&self, payload: &[u8], correlation_id: Uuid) -> PipelineResult<usize> {
        let event = event::parse(payload)?;
        debug!(
            source = %event.source_name,
            event_id = event.event_id.as_deref().unwrap_or("-"),
            locations = event.locations.len(),
            "Decoded file-ready event"
        );

        for file in &event.locations {
            if let IngestOutcome::Unclassified = self
                .coordinator
                .ingest(&file.location, &event.source_name, correlation_id)
                .await?
            {
                debug!(location = %file.location, "Location left unclassified");
            }
        }

        Ok(event.locations.len())
    }
}
