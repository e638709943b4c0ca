//! Topic-based publish/subscribe transport for the saga choreography.
//!
//! The contract is deliberately weak, matching what a durable broker
//! actually gives you: at-least-once delivery, no ordering across topics,
//! and possible redelivery of any message that was not acknowledged.
//! Subscribers must acknowledge only after their local state change has
//! committed; business logic, not the transport, is responsible for
//! tolerating duplicates.
//!
//! [`MemoryBus`] is the in-process implementation used by the default
//! wiring and the test suites. It honors the same ack discipline and can
//! force redelivery of unacknowledged messages.

pub mod error;
pub mod memory;
pub mod publish;

pub use error::BusError;
pub use memory::MemoryBus;
pub use publish::{RetryPolicy, publish_json, publish_json_with_retry};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// A message handed to a subscriber.
///
/// The delivery stays in flight until [`Delivery::ack`] is called; an
/// unacked delivery may be handed out again.
pub struct Delivery {
    topic: String,
    body: Vec<u8>,
    acker: Arc<dyn Acker>,
}

impl Delivery {
    /// The topic this message was published on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The raw payload bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Acknowledges the delivery, removing it from the in-flight set.
    ///
    /// Call this only after the local state mutation has durably committed,
    /// or (for malformed payloads) to discard the message.
    pub fn ack(self) {
        self.acker.ack();
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.topic)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Backend hook invoked when a delivery is acknowledged.
pub(crate) trait Acker: Send + Sync {
    fn ack(&self);
}

/// A subscription to one topic.
///
/// Deliveries are received strictly one at a time, so a consumer task that
/// loops on [`Subscription::recv`] processes its topic sequentially.
pub struct Subscription {
    pub(crate) receiver: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Waits for the next delivery. Returns `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// A durable topic-based publish/subscribe transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a payload on a topic.
    ///
    /// Returning `Ok` means the broker accepted the message; it does not
    /// mean any subscriber has seen it yet.
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()>;

    /// Binds a new subscription to a topic.
    ///
    /// Messages published while a topic has no subscription are held and
    /// delivered when the first subscription binds.
    async fn subscribe(&self, topic: &str) -> Result<Subscription>;
}

#[async_trait]
impl<B: EventBus + ?Sized> EventBus for Arc<B> {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        (**self).publish(topic, body).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        (**self).subscribe(topic).await
    }
}
