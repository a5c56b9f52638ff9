//! Message Bus Abstraction
//!
//! [`MessageBus`] is the transport seam: `publish` fans a message out to
//! every subscriber of a topic, `subscribe` returns a receiver that yields
//! messages in arrival order.
//!
//! [`InMemoryBus`] implements the trait over unbounded tokio channels. It is
//! the deployment default for single-process setups and the only transport
//! the test suite needs; an external broker implementation lives behind the
//! same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

use crate::error::Result;

/// One message on the bus. `timestamp`, `producer_id` and `message_id` are
/// stamped by the gateway at publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMessage {
    pub message_id: String,
    pub topic: String,
    pub key: Option<String>,
    pub payload: Value,
    /// Milliseconds since Unix epoch
    pub timestamp: i64,
    pub producer_id: String,
}

/// Receiving half of a topic subscription.
pub struct MessageReceiver {
    inner: mpsc::UnboundedReceiver<StreamMessage>,
}

impl MessageReceiver {
    /// Next message in arrival order; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<StreamMessage> {
        self.inner.recv().await
    }
}

/// Transport seam between the gateway and whatever actually moves bytes.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Deliver `message` to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, message: StreamMessage) -> Result<()>;

    /// Subscribe to `topic`. Messages published after this call are
    /// delivered in arrival order.
    async fn subscribe(&self, topic: &str) -> Result<MessageReceiver>;
}

/// In-process bus over unbounded tokio channels.
#[derive(Default)]
pub struct InMemoryBus {
    topics: RwLock<HashMap<String, Vec<mpsc::UnboundedSender<StreamMessage>>>>,
}

impl InMemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, message: StreamMessage) -> Result<()> {
        let mut topics = self.topics.write().await;
        if let Some(senders) = topics.get_mut(topic) {
            // Drop subscribers whose receivers are gone.
            senders.retain(|sender| sender.send(message.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<MessageReceiver> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_default().push(sender);
        Ok(MessageReceiver { inner: receiver })
    }
}
