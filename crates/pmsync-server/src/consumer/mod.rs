//! Topic consumers
//!
//! The [`ConsumerOrchestrator`] stands up one [`ActiveConsumptionUnit`] per
//! configured topic. A unit runs `threads` worker tasks, each pulling from its
//! own [`MessageSource`] and handing payloads to the shared
//! `MessageDispatcher`.

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod orchestrator;
pub mod source;
pub mod unit;

#[cfg(feature = "kafka")]
pub use kafka::KafkaSourceFactory;
pub use orchestrator::{ConsumerOrchestrator, StartReport};
pub use source::{ChannelSourceFactory, InboundMessage, MessageSource, SourceFactory};
pub use unit::ActiveConsumptionUnit;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Topic '{0}' is configured more than once")]
    DuplicateTopic(String),

    #[error("Topic '{0}' already has an active consumer unit")]
    AlreadyRunning(String),

    #[error("Invalid broker address '{broker}' for topic '{topic}': {reason}")]
    InvalidBroker {
        topic: String,
        broker: String,
        reason: String,
    },

    #[error("Topic '{0}' needs at least one consumer thread")]
    NoWorkers(String),

    #[error("Failed to create consumer {worker} for topic '{topic}': {reason}")]
    Client {
        topic: String,
        worker: usize,
        reason: String,
    },

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Unit for '{topic}' did not stop within {grace:?}, aborted {abandoned} worker(s)")]
    StopTimeout {
        topic: String,
        grace: Duration,
        abandoned: usize,
    },

    #[error("Worker for '{topic}' panicked: {reason}")]
    WorkerPanicked { topic: String, reason: String },
}
