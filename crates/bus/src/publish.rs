//! Publishing helpers for the post-commit boundary.
//!
//! Once a service has committed its local state, the matching event must go
//! out even if the broker hiccups. These helpers retry with a fixed backoff
//! and report exhaustion as an error the caller can log; they never undo
//! the already-committed state.

use std::time::Duration;

use serde::Serialize;

use crate::{BusError, EventBus, Result};

/// Retry budget for a post-commit publish.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Serializes `payload` as JSON and publishes it once.
pub async fn publish_json<B, T>(bus: &B, topic: &str, payload: &T) -> Result<()>
where
    B: EventBus + ?Sized,
    T: Serialize + Sync,
{
    let body = serde_json::to_vec(payload)?;
    bus.publish(topic, body).await
}

/// Serializes `payload` and publishes it, retrying per `policy`.
///
/// Serialization failures are not retried; only broker failures are.
pub async fn publish_json_with_retry<B, T>(
    bus: &B,
    topic: &str,
    payload: &T,
    policy: RetryPolicy,
) -> Result<()>
where
    B: EventBus + ?Sized,
    T: Serialize + Sync,
{
    let body = serde_json::to_vec(payload)?;
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match bus.publish(topic, body.clone()).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::warn!(topic, attempt, error = %err, "publish failed");
                last_err = Some(err);
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
    metrics::counter!("bus_publish_retries_exhausted_total", "topic" => topic.to_string())
        .increment(1);
    Err(BusError::RetriesExhausted {
        topic: topic.to_string(),
        attempts,
        source: Box::new(last_err.unwrap_or_else(|| BusError::Closed(topic.to_string()))),
    })
}
