//! In-process broker with the same delivery contract as a durable one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Acker, Delivery, EventBus, Result, Subscription};

/// In-memory event bus.
///
/// Fans each published message out to every subscription bound to its
/// topic. Every delivery is tracked in flight until acknowledged;
/// [`MemoryBus::redeliver_unacked`] hands unacked messages out again, which
/// is how tests exercise the at-least-once path without a broker crash.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    subscriptions: HashMap<String, Vec<SubEntry>>,
    /// Messages published before any subscription bound to the topic.
    parked: HashMap<String, Vec<Vec<u8>>>,
    next_delivery_id: u64,
}

struct SubEntry {
    sender: mpsc::UnboundedSender<Delivery>,
    inflight: Arc<Mutex<HashMap<u64, Vec<u8>>>>,
}

struct MemoryAcker {
    inflight: Arc<Mutex<HashMap<u64, Vec<u8>>>>,
    delivery_id: u64,
}

impl Acker for MemoryAcker {
    fn ack(&self) {
        self.inflight.lock().unwrap().remove(&self.delivery_id);
    }
}

impl MemoryBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-sends every unacknowledged delivery on `topic` to its
    /// subscription, simulating a consumer crash before ack.
    pub fn redeliver_unacked(&self, topic: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut redelivered = 0;
        let Some(entries) = inner.subscriptions.get(topic) else {
            return 0;
        };
        // Drain the in-flight sets first: re-sending allocates fresh ids.
        let mut to_send = Vec::new();
        for entry in entries {
            let mut inflight = entry.inflight.lock().unwrap();
            let bodies: Vec<Vec<u8>> = inflight.values().cloned().collect();
            inflight.clear();
            if !bodies.is_empty() {
                to_send.push((entry.sender.clone(), entry.inflight.clone(), bodies));
            }
        }
        for (sender, inflight, bodies) in to_send {
            for body in bodies {
                let id = inner.next_delivery_id;
                inner.next_delivery_id += 1;
                inflight.lock().unwrap().insert(id, body.clone());
                let delivery = Delivery {
                    topic: topic.to_string(),
                    body,
                    acker: Arc::new(MemoryAcker {
                        inflight: inflight.clone(),
                        delivery_id: id,
                    }),
                };
                if sender.send(delivery).is_ok() {
                    redelivered += 1;
                }
            }
        }
        redelivered
    }

    /// Number of messages parked on `topic` waiting for a first
    /// subscription.
    pub fn parked_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.parked.get(topic).map(Vec::len).unwrap_or(0)
    }

    /// Number of deliveries currently awaiting acknowledgment on a topic.
    pub fn unacked_count(&self, topic: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .subscriptions
            .get(topic)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.inflight.lock().unwrap().len())
                    .sum()
            })
            .unwrap_or(0)
    }

    fn deliver(inner: &mut Inner, topic: &str, body: Vec<u8>) {
        let id = inner.next_delivery_id;
        inner.next_delivery_id += 1;
        let Some(entries) = inner.subscriptions.get(topic) else {
            inner.parked.entry(topic.to_string()).or_default().push(body);
            return;
        };
        if entries.is_empty() {
            inner.parked.entry(topic.to_string()).or_default().push(body);
            return;
        }
        for entry in entries {
            entry.inflight.lock().unwrap().insert(id, body.clone());
            let delivery = Delivery {
                topic: topic.to_string(),
                body: body.clone(),
                acker: Arc::new(MemoryAcker {
                    inflight: entry.inflight.clone(),
                    delivery_id: id,
                }),
            };
            // A dropped subscription just stops receiving; the message
            // stays in its inflight map, mirroring an unacked delivery.
            let _ = entry.sender.send(delivery);
        }
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, body: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        Self::deliver(&mut inner, topic, body);
        metrics::counter!("bus_messages_published_total", "topic" => topic.to_string())
            .increment(1);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner.subscriptions.entry(topic.to_string()).or_default().push(SubEntry {
            sender,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        });
        // Flush anything that arrived before the subscription bound.
        if let Some(parked) = inner.parked.remove(topic) {
            for body in parked {
                Self::deliver(&mut inner, topic, body);
            }
        }
        tracing::debug!(topic, "subscription bound");
        Ok(Subscription { receiver })
    }
}
