//! Message sources feeding consumer workers

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::ConsumerError;
use crate::config::TopicSpec;

/// One consumed message, detached from the client that delivered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition: 0,
            offset: 0,
            payload: Some(payload.into()),
        }
    }
}

#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message; `None` once the source is closed for good
    async fn recv(&mut self) -> Option<Result<InboundMessage, ConsumerError>>;

    /// Mark `message` as handled so its offset can be committed
    fn ack(&mut self, message: &InboundMessage) -> Result<(), ConsumerError>;
}

/// Builds the sources of a consumption unit, one per worker
pub trait SourceFactory: Send + Sync {
    fn create(
        &self,
        spec: &TopicSpec,
        worker: usize,
    ) -> Result<Box<dyn MessageSource>, ConsumerError>;
}

type SharedReceiver = Arc<Mutex<mpsc::UnboundedReceiver<InboundMessage>>>;

/// In-process sources backed by one unbounded channel per topic.
/// Workers of the same topic compete for messages like members of one
/// consumer group.
#[derive(Default)]
pub struct ChannelSourceFactory {
    channels: DashMap<String, (mpsc::UnboundedSender<InboundMessage>, SharedReceiver)>,
}

impl ChannelSourceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender publishing to `topic`
    pub fn sender(&self, topic: &str) -> mpsc::UnboundedSender<InboundMessage> {
        self.channel(topic).0
    }

    fn channel(&self, topic: &str) -> (mpsc::UnboundedSender<InboundMessage>, SharedReceiver) {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Arc::new(Mutex::new(rx)))
            })
            .clone()
    }
}

impl SourceFactory for ChannelSourceFactory {
    fn create(
        &self,
        spec: &TopicSpec,
        _worker: usize,
    ) -> Result<Box<dyn MessageSource>, ConsumerError> {
        let (_, receiver) = self.channel(&spec.name);
        Ok(Box::new(ChannelSource { receiver }))
    }
}

struct ChannelSource {
    receiver: SharedReceiver,
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn recv(&mut self) -> Option<Result<InboundMessage, ConsumerError>> {
        self.receiver.lock().await.recv().await.map(Ok)
    }

    fn ack(&mut self, _message: &InboundMessage) -> Result<(), ConsumerError> {
        Ok(())
    }
}
