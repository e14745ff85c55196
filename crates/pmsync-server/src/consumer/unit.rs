//! Running consumer unit for one topic

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::source::MessageSource;
use super::ConsumerError;
use crate::config::TopicSpec;
use crate::ingest::MessageDispatcher;

/// Pause after a broker receive error before polling again
const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Worker tasks bound to one topic, stopped together through one token
pub struct ActiveConsumptionUnit {
    topic: String,
    group_id: String,
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl ActiveConsumptionUnit {
    /// Spawn one worker task per source
    pub(crate) fn spawn(
        spec: &TopicSpec,
        sources: Vec<Box<dyn MessageSource>>,
        dispatcher: Arc<MessageDispatcher>,
    ) -> Self {
        let token = CancellationToken::new();

        let workers = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| {
                let span = info_span!("consumer", topic = %spec.name, worker = index);
                tokio::spawn(
                    run_worker(source, dispatcher.clone(), token.child_token()).instrument(span),
                )
            })
            .collect();

        Self {
            topic: spec.name.clone(),
            group_id: spec.consumer.group_id.clone(),
            token,
            workers,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Cancel and abort every worker without waiting
    pub(crate) fn abort(self) {
        self.token.cancel();
        for worker in &self.workers {
            worker.abort();
        }
    }

    /// Cancel the workers and wait up to `grace` for in-flight messages.
    /// Workers still running afterwards are aborted.
    pub async fn stop(mut self, grace: Duration) -> Result<(), ConsumerError> {
        self.token.cancel();

        let joined = tokio::time::timeout(grace, join_all(self.workers.iter_mut())).await;

        match joined {
            Ok(results) => {
                let panicked = results.into_iter().find_map(|r| r.err());
                match panicked {
                    Some(e) => Err(ConsumerError::WorkerPanicked {
                        topic: self.topic,
                        reason: e.to_string(),
                    }),
                    None => Ok(()),
                }
            },
            Err(_) => {
                let mut abandoned = 0;
                for worker in self.workers.iter().filter(|w| !w.is_finished()) {
                    worker.abort();
                    abandoned += 1;
                }
                Err(ConsumerError::StopTimeout {
                    topic: self.topic,
                    grace,
                    abandoned,
                })
            },
        }
    }
}

async fn run_worker(
    mut source: Box<dyn MessageSource>,
    dispatcher: Arc<MessageDispatcher>,
    token: CancellationToken,
) {
    debug!("Worker started");

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            next = source.recv() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                warn!(error = %e, "Receive failed");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => continue,
                }
            },
            None => {
                info!("Source closed");
                break;
            },
        };

        // Not raced against cancellation: the grace period bounds it instead
        dispatcher
            .dispatch(message.payload.as_deref(), &message.topic)
            .await;

        if let Err(e) = source.ack(&message) {
            warn!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "Failed to store offset"
            );
        }
    }

    debug!("Worker stopped");
}
