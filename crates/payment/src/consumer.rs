//! Payment-side choreography: answers charge requests.
//!
//! One subscription, `payment.charge.requested`. Every request is first
//! recorded as `pending`; only an unsettled record reaches the provider.
//! A redelivered request for a settled record re-announces the recorded
//! outcome without charging again.

use std::sync::Arc;

use bus::{publish_json_with_retry, Delivery, EventBus, RetryPolicy};
use messages::{topics, PaymentChargeRequested, PaymentFailed, PaymentSucceeded};
use tokio::task::JoinHandle;

use crate::provider::{ChargeOutcome, PaymentProvider};
use crate::store::{PaymentRecord, PaymentState, PaymentStore};

/// What to do with a delivery after handling it.
enum Outcome {
    /// Handled (or poison/duplicate): acknowledge.
    Ack,
    /// Transient failure: leave unacked for redelivery.
    Retain,
}

/// The Payment service's event consumer.
pub struct PaymentConsumer<S, P, B> {
    store: Arc<S>,
    provider: Arc<P>,
    bus: B,
    retry: RetryPolicy,
}

impl<S, P, B: Clone> Clone for PaymentConsumer<S, P, B> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            provider: self.provider.clone(),
            bus: self.bus.clone(),
            retry: self.retry,
        }
    }
}

impl<S, P, B> PaymentConsumer<S, P, B>
where
    S: PaymentStore + 'static,
    P: PaymentProvider + 'static,
    B: EventBus + Clone + 'static,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, bus: B) -> Self {
        Self {
            store,
            provider,
            bus,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the publish retry budget.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Binds the subscription and spawns the consumer task.
    pub async fn start(&self) -> bus::Result<Vec<JoinHandle<()>>> {
        let mut requests = self.bus.subscribe(topics::PAYMENT_CHARGE_REQUESTED).await?;

        let this = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(delivery) = requests.recv().await {
                this.dispatch(delivery).await;
            }
            tracing::info!(topic = topics::PAYMENT_CHARGE_REQUESTED, "consumer stopped");
        });
        Ok(vec![handle])
    }

    async fn dispatch(&self, delivery: Delivery) {
        match self.handle_charge_requested(delivery.body()).await {
            Outcome::Ack => delivery.ack(),
            Outcome::Retain => {}
        }
    }

    async fn handle_charge_requested(&self, body: &[u8]) -> Outcome {
        let request: PaymentChargeRequested = match messages::decode(body) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "charge request: discarding malformed payload");
                return Outcome::Ack;
            }
        };

        let record = match self
            .store
            .upsert_pending(request.order_id, request.amount_cents)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                tracing::error!(order_id = %request.order_id, error = %err, "record failed");
                return Outcome::Retain;
            }
        };

        if record.state.is_settled() {
            // At-least-once duplicate: the customer was already charged
            // (or declined); repeat the answer, never the charge.
            tracing::info!(order_id = %record.order_id, state = %record.state,
                "duplicate charge request, re-announcing outcome");
            metrics::counter!("payment_duplicate_requests_total").increment(1);
            self.announce_settled(&record).await;
            return Outcome::Ack;
        }

        let outcome = self
            .provider
            .charge(request.order_id, request.amount_cents)
            .await;
        let (state, provider_ref, reason) = match &outcome {
            ChargeOutcome::Approved { provider_ref } => {
                (PaymentState::Succeeded, provider_ref.as_str(), "")
            }
            ChargeOutcome::Declined {
                provider_ref,
                reason,
            } => (PaymentState::Failed, provider_ref.as_str(), reason.as_str()),
        };

        if let Err(err) = self
            .store
            .settle(request.order_id, state, provider_ref, reason)
            .await
        {
            // The record stays pending; redelivery retries the whole
            // attempt, and the provider dedupes by order reference.
            tracing::error!(order_id = %request.order_id, error = %err, "settle failed");
            return Outcome::Retain;
        }

        metrics::counter!("payment_charges_total", "outcome" => state.as_str()).increment(1);
        tracing::info!(order_id = %request.order_id, state = %state,
            amount = %request.amount_cents, "charge settled");

        let record = PaymentRecord {
            order_id: request.order_id,
            amount: request.amount_cents,
            state,
            provider_ref: provider_ref.to_string(),
            reason: reason.to_string(),
            updated_at: chrono::Utc::now(),
        };
        self.announce_settled(&record).await;
        Outcome::Ack
    }

    /// Publishes the outcome event matching a settled record.
    async fn announce_settled(&self, record: &PaymentRecord) {
        let result = match record.state {
            PaymentState::Succeeded => {
                let event = PaymentSucceeded {
                    order_id: record.order_id,
                    provider_ref: record.provider_ref.clone(),
                };
                publish_json_with_retry(&self.bus, topics::PAYMENT_SUCCEEDED, &event, self.retry)
                    .await
            }
            PaymentState::Failed => {
                let event = PaymentFailed {
                    order_id: record.order_id,
                    reason: record.reason.clone(),
                    provider_ref: record.provider_ref.clone(),
                };
                publish_json_with_retry(&self.bus, topics::PAYMENT_FAILED, &event, self.retry)
                    .await
            }
            PaymentState::Pending => return,
        };
        if let Err(err) = result {
            // The settle is committed; the order side recovers when the
            // charge request is redelivered and the outcome re-announced.
            tracing::error!(order_id = %record.order_id, error = %err, "announce failed");
        }
    }
}
