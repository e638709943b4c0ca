//! Order consumer integration tests over the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use bus::{EventBus, MemoryBus};
use common::{BookId, Money, OrderId, UserId};
use messages::{topics, InventoryResult, PaymentChargeRequested, PaymentFailed, PaymentSucceeded};
use orders::{
    CartItem, MemoryOrderStore, Order, OrderConsumer, OrderStatus, OrderStore, ReleasePolicy,
};

async fn setup(policy: ReleasePolicy) -> (MemoryBus, Arc<MemoryOrderStore>) {
    let bus = MemoryBus::new();
    let store = Arc::new(MemoryOrderStore::new());
    let consumer = OrderConsumer::new(store.clone(), bus.clone()).with_policy(policy);
    consumer.start().await.unwrap();
    (bus, store)
}

async fn seed_order(store: &MemoryOrderStore, qty: i64) -> Order {
    let order = Order::from_cart(
        UserId::new(),
        &[CartItem {
            book_id: BookId::new(1),
            title: "Snow Crash".to_string(),
            qty,
            unit_price: Money::from_cents(1200),
        }],
    );
    store.insert(&order).await.unwrap();
    order
}

/// Polls until all deliveries on `topic` are acknowledged.
async fn drained(bus: &MemoryBus, topic: &str) {
    for _ in 0..200 {
        if bus.unacked_count(topic) == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("topic {topic} still has unacked deliveries");
}

async fn status_of(store: &MemoryOrderStore, order_id: OrderId) -> OrderStatus {
    store.get(order_id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn reservation_ok_requests_a_charge() {
    let (bus, store) = setup(ReleasePolicy::default()).await;
    let mut charges = bus.subscribe(topics::PAYMENT_CHARGE_REQUESTED).await.unwrap();
    let order = seed_order(&store, 2).await;

    bus::publish_json(
        &bus,
        topics::INVENTORY_RESERVED,
        &InventoryResult {
            order_id: order.id,
            ok: true,
            reason: None,
        },
    )
    .await
    .unwrap();

    let delivery = charges.recv().await.unwrap();
    let charge: PaymentChargeRequested = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert_eq!(charge.order_id, order.id);
    assert_eq!(charge.amount_cents, Money::from_cents(2400));
    assert_eq!(status_of(&store, order.id).await, OrderStatus::Created);
}

#[tokio::test]
async fn reservation_rejected_fails_without_a_charge() {
    let (bus, store) = setup(ReleasePolicy::default()).await;
    let order = seed_order(&store, 2).await;

    bus::publish_json(
        &bus,
        topics::INVENTORY_REJECTED,
        &InventoryResult {
            order_id: order.id,
            ok: false,
            reason: Some("insufficient stock".to_string()),
        },
    )
    .await
    .unwrap();
    drained(&bus, topics::INVENTORY_REJECTED).await;

    assert_eq!(status_of(&store, order.id).await, OrderStatus::Failed);
    assert_eq!(
        bus.parked_count(topics::PAYMENT_CHARGE_REQUESTED),
        0,
        "no charge is requested for a rejected reservation"
    );
}

#[tokio::test]
async fn payment_success_pays_and_confirms_stock() {
    let (bus, store) = setup(ReleasePolicy::default()).await;
    let mut paid = bus.subscribe(topics::ORDER_PAID).await.unwrap();
    let order = seed_order(&store, 3).await;

    bus::publish_json(
        &bus,
        topics::PAYMENT_SUCCEEDED,
        &PaymentSucceeded {
            order_id: order.id,
            provider_ref: "FAKE-1".to_string(),
        },
    )
    .await
    .unwrap();

    let delivery = paid.recv().await.unwrap();
    let event: messages::OrderPaid = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert_eq!(event.order_id, order.id);
    assert_eq!(event.items[0].qty, 3);
    assert_eq!(status_of(&store, order.id).await, OrderStatus::Paid);
}

#[tokio::test]
async fn payment_failure_holds_the_reservation_by_default() {
    let (bus, store) = setup(ReleasePolicy::default()).await;
    let order = seed_order(&store, 1).await;

    bus::publish_json(
        &bus,
        topics::PAYMENT_FAILED,
        &PaymentFailed {
            order_id: order.id,
            reason: "insufficient_funds".to_string(),
            provider_ref: "FAKE-2".to_string(),
        },
    )
    .await
    .unwrap();
    drained(&bus, topics::PAYMENT_FAILED).await;

    assert_eq!(status_of(&store, order.id).await, OrderStatus::Failed);
    assert_eq!(
        bus.parked_count(topics::ORDER_CANCELLED),
        0,
        "the reservation stays held"
    );
}

#[tokio::test]
async fn payment_failure_releases_under_the_release_policy() {
    let (bus, store) = setup(ReleasePolicy {
        release_on_payment_failure: true,
    })
    .await;
    let mut cancelled = bus.subscribe(topics::ORDER_CANCELLED).await.unwrap();
    let order = seed_order(&store, 2).await;

    bus::publish_json(
        &bus,
        topics::PAYMENT_FAILED,
        &PaymentFailed {
            order_id: order.id,
            reason: "insufficient_funds".to_string(),
            provider_ref: "FAKE-3".to_string(),
        },
    )
    .await
    .unwrap();

    let delivery = cancelled.recv().await.unwrap();
    let event: messages::OrderCancelled = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert_eq!(event.order_id, order.id);
    assert_eq!(event.items[0].qty, 2);
    assert_eq!(status_of(&store, order.id).await, OrderStatus::Failed);
}

#[tokio::test]
async fn redelivered_reply_to_a_terminal_order_changes_nothing() {
    let (bus, store) = setup(ReleasePolicy::default()).await;
    let order = seed_order(&store, 1).await;

    let success = PaymentSucceeded {
        order_id: order.id,
        provider_ref: "FAKE-4".to_string(),
    };
    bus::publish_json(&bus, topics::PAYMENT_SUCCEEDED, &success)
        .await
        .unwrap();
    drained(&bus, topics::PAYMENT_SUCCEEDED).await;
    assert_eq!(status_of(&store, order.id).await, OrderStatus::Paid);

    // At-least-once: the same reply arrives again, then a stale rejection.
    bus::publish_json(&bus, topics::PAYMENT_SUCCEEDED, &success)
        .await
        .unwrap();
    bus::publish_json(
        &bus,
        topics::INVENTORY_REJECTED,
        &InventoryResult {
            order_id: order.id,
            ok: false,
            reason: Some("late".to_string()),
        },
    )
    .await
    .unwrap();
    drained(&bus, topics::PAYMENT_SUCCEEDED).await;
    drained(&bus, topics::INVENTORY_REJECTED).await;

    assert_eq!(status_of(&store, order.id).await, OrderStatus::Paid);
    assert_eq!(
        bus.parked_count(topics::ORDER_PAID),
        1,
        "order.paid is emitted exactly once"
    );
}

#[tokio::test]
async fn reply_for_an_unknown_order_is_discarded() {
    let (bus, _store) = setup(ReleasePolicy::default()).await;

    bus::publish_json(
        &bus,
        topics::INVENTORY_RESERVED,
        &InventoryResult {
            order_id: OrderId::new(),
            ok: true,
            reason: None,
        },
    )
    .await
    .unwrap();
    drained(&bus, topics::INVENTORY_RESERVED).await;

    assert_eq!(bus.parked_count(topics::PAYMENT_CHARGE_REQUESTED), 0);
}
