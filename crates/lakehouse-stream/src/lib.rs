//! Lakehouse Stream Gateway
//!
//! The bridge between the lakehouse and a message bus. Producers publish
//! enriched messages to topics; the gateway runs one long-lived consume loop
//! per subscribed topic, dispatching each message to its registered handler.
//!
//! ## Failure Isolation
//!
//! The central contract of streaming mode: **one bad message never halts the
//! consumer loop**. A handler error is logged, counted, and the loop moves
//! on to the next message. Streaming favors availability over per-message
//! delivery guarantees; the batch path is where all-or-nothing semantics
//! live.
//!
//! ## Ordering
//!
//! Messages within a single topic are delivered to a consumer in arrival
//! order. No cross-topic ordering is provided or required.
//!
//! ## The Bus
//!
//! [`MessageBus`] abstracts the transport. [`InMemoryBus`] is the shipped
//! implementation (tokio channels); a Kafka-backed bus plugs in behind the
//! same trait without touching the gateway. The wire format of any external
//! bus is deliberately out of scope here.

pub mod bus;
pub mod error;
pub mod gateway;

pub use bus::{InMemoryBus, MessageBus, MessageReceiver, StreamMessage};
pub use error::{Result, StreamError};
pub use gateway::{HandlerResult, StreamGateway};
