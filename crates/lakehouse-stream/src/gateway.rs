//! Stream Gateway
//!
//! [`StreamGateway`] owns the handler registry and the consume loops. One
//! gateway instance is shared (via `Arc`) between the publish path and every
//! consumer task.
//!
//! ## Consume Loop Contract
//!
//! For each message: look up the topic's handler, invoke it, record the
//! processing latency. On handler error: log, increment the per-topic error
//! counter, continue. The loop only ends when the bus closes or the task is
//! aborted - it must tolerate indefinite operation, so no per-message state
//! outlives the iteration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use lakehouse_observability::metrics;

use crate::bus::{MessageBus, StreamMessage};
use crate::error::{Result, StreamError};

/// What a handler returns; the error half is opaque to the gateway.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

type HandlerFn = Arc<dyn Fn(StreamMessage) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Publish/subscribe bridge with per-topic processing callbacks.
pub struct StreamGateway {
    bus: Arc<dyn MessageBus>,
    handlers: RwLock<HashMap<String, HandlerFn>>,
    producer_id: String,
}

impl StreamGateway {
    pub fn new(bus: Arc<dyn MessageBus>) -> Arc<Self> {
        Arc::new(Self {
            bus,
            handlers: RwLock::new(HashMap::new()),
            producer_id: format!("lakehouse-{}", uuid::Uuid::new_v4()),
        })
    }

    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    /// Publish a payload to `topic`, enriched with `timestamp`,
    /// `producer_id` and a fresh `message_id`. Returns the message ID.
    pub async fn publish(&self, topic: &str, key: Option<String>, payload: Value) -> Result<String> {
        let message = StreamMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            key,
            payload,
            timestamp: chrono::Utc::now().timestamp_millis(),
            producer_id: self.producer_id.clone(),
        };
        let message_id = message.message_id.clone();

        self.bus.publish(topic, message).await?;
        metrics::STREAM_PUBLISHED_TOTAL.with_label_values(&[topic]).inc();
        Ok(message_id)
    }

    /// Bind a processing function to `topic`. Re-registering replaces the
    /// previous handler; in-flight consume loops pick up the new one on the
    /// next message.
    pub async fn register_handler<F>(&self, topic: &str, handler: F)
    where
        F: Fn(StreamMessage) -> BoxFuture<'static, HandlerResult> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().await;
        handlers.insert(topic.to_string(), Arc::new(handler));
    }

    /// Blocking consume loop for one topic. Runs until the bus closes or
    /// the surrounding task is aborted.
    ///
    /// # Errors
    ///
    /// `NoHandler` when the topic has no registered handler at loop start -
    /// consuming without a handler is a wiring bug, not a runtime condition.
    pub async fn consume(&self, topic: &str, group_id: &str) -> Result<()> {
        {
            let handlers = self.handlers.read().await;
            if !handlers.contains_key(topic) {
                return Err(StreamError::NoHandler(topic.to_string()));
            }
        }

        let mut receiver = self.bus.subscribe(topic).await?;
        tracing::info!(topic = %topic, group = %group_id, "Consumer loop started");

        while let Some(message) = receiver.recv().await {
            let handler = {
                let handlers = self.handlers.read().await;
                match handlers.get(topic) {
                    Some(handler) => handler.clone(),
                    None => continue, // handler was removed; drop the message
                }
            };

            let message_id = message.message_id.clone();
            let started = Instant::now();
            match handler(message).await {
                Ok(()) => {
                    metrics::STREAM_PROCESSED_TOTAL.with_label_values(&[topic]).inc();
                }
                Err(e) => {
                    // Failure isolation: log, count, keep consuming.
                    metrics::STREAM_HANDLER_ERRORS_TOTAL
                        .with_label_values(&[topic])
                        .inc();
                    metrics::ERRORS_TOTAL
                        .with_label_values(&["stream_handler"])
                        .inc();
                    tracing::error!(
                        topic = %topic,
                        group = %group_id,
                        message_id = %message_id,
                        error = %e,
                        "Stream handler failed; continuing with next message"
                    );
                }
            }
            metrics::STREAM_PROCESSING_LATENCY
                .with_label_values(&[topic])
                .observe(started.elapsed().as_secs_f64());
        }

        tracing::info!(topic = %topic, group = %group_id, "Consumer loop ended (bus closed)");
        Ok(())
    }

    /// Spawn the consume loop as a background task. Abort the handle to
    /// cancel; a mid-message abort loses at most that message.
    pub fn spawn_consumer(self: &Arc<Self>, topic: String, group_id: String) -> JoinHandle<Result<()>> {
        let gateway = self.clone();
        tokio::spawn(async move { gateway.consume(&topic, &group_id).await })
    }
}
