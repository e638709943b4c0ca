//! Inventory consumer integration tests over the in-memory bus.

use std::sync::Arc;
use std::time::Duration;

use bus::{EventBus, MemoryBus};
use common::{BookId, Money, OrderId, UserId};
use inventory::{InventoryConsumer, MemoryProcessedLedger, MemoryStockStore, StockStore};
use messages::{topics, InventoryResult, OrderCreated, OrderLine, OrderPaid, QuantityLine};

async fn setup(stock: &[(i64, i64)]) -> (MemoryBus, Arc<MemoryStockStore>) {
    let bus = MemoryBus::new();
    let store = Arc::new(MemoryStockStore::new());
    let rows: Vec<(BookId, i64)> = stock.iter().map(|(id, q)| (BookId::new(*id), *q)).collect();
    store.seed(&rows).await.unwrap();

    let consumer = InventoryConsumer::new(store.clone(), Arc::new(MemoryProcessedLedger::new()), bus.clone());
    consumer.start().await.unwrap();
    (bus, store)
}

fn created_event(order_id: OrderId, book_id: i64, qty: i64) -> OrderCreated {
    let unit = Money::from_cents(1000);
    OrderCreated {
        order_id,
        user_id: UserId::new(),
        items: vec![OrderLine {
            book_id: BookId::new(book_id),
            title: "The Rust Programming Language".to_string(),
            qty,
            unit_cents: unit,
            line_cents: unit.times(qty),
        }],
        total_cents: unit.times(qty),
    }
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

#[tokio::test]
async fn successful_reservation_answers_reserved() {
    let (bus, store) = setup(&[(1, 10)]).await;
    let mut results = bus.subscribe(topics::INVENTORY_RESERVED).await.unwrap();

    let order_id = OrderId::new();
    bus::publish_json(&bus, topics::ORDER_CREATED, &created_event(order_id, 1, 3))
        .await
        .unwrap();

    let delivery = results.recv().await.unwrap();
    let result: InventoryResult = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert!(result.ok);
    assert_eq!(result.order_id, order_id);
    assert_eq!(result.reason, None);

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.reserved_qty, 3);
}

#[tokio::test]
async fn insufficient_stock_answers_rejected() {
    let (bus, store) = setup(&[(1, 2)]).await;
    let mut results = bus.subscribe(topics::INVENTORY_REJECTED).await.unwrap();

    let order_id = OrderId::new();
    bus::publish_json(&bus, topics::ORDER_CREATED, &created_event(order_id, 1, 5))
        .await
        .unwrap();

    let delivery = results.recv().await.unwrap();
    let result: InventoryResult = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert!(!result.ok);
    assert!(result.reason.unwrap().contains("insufficient stock"));

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.reserved_qty, 0);
}

#[tokio::test]
async fn unknown_book_answers_rejected() {
    let (bus, _store) = setup(&[(1, 2)]).await;
    let mut results = bus.subscribe(topics::INVENTORY_REJECTED).await.unwrap();

    bus::publish_json(
        &bus,
        topics::ORDER_CREATED,
        &created_event(OrderId::new(), 404, 1),
    )
    .await
    .unwrap();

    let delivery = results.recv().await.unwrap();
    let result: InventoryResult = messages::decode(delivery.body()).unwrap();
    delivery.ack();
    assert!(!result.ok);
    assert!(result.reason.unwrap().contains("no stock record"));
}

#[tokio::test]
async fn malformed_order_created_is_discarded() {
    let (bus, store) = setup(&[(1, 10)]).await;

    bus.publish(topics::ORDER_CREATED, b"{definitely not json".to_vec())
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CREATED).await;

    // Nothing reserved, nothing published.
    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.reserved_qty, 0);
}

#[tokio::test]
async fn duplicate_order_created_reserves_once() {
    let (bus, store) = setup(&[(1, 10)]).await;
    let order_id = OrderId::new();
    let event = created_event(order_id, 1, 3);

    // At-least-once: the same order announcement arrives twice.
    bus::publish_json(&bus, topics::ORDER_CREATED, &event).await.unwrap();
    bus::publish_json(&bus, topics::ORDER_CREATED, &event).await.unwrap();
    drained(&bus, topics::ORDER_CREATED).await;

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.reserved_qty, 3, "the hold must not double");
}

#[tokio::test]
async fn cancel_arriving_before_the_order_leaves_no_hold() {
    let (bus, store) = setup(&[(1, 10)]).await;
    let order_id = OrderId::new();

    // Separate topics carry no ordering guarantee, so the cancel can be
    // processed before the announcement that opened the order.
    let cancelled = messages::OrderCancelled {
        order_id,
        items: vec![QuantityLine {
            book_id: BookId::new(1),
            qty: 3,
        }],
    };
    bus::publish_json(&bus, topics::ORDER_CANCELLED, &cancelled)
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CANCELLED).await;

    bus::publish_json(&bus, topics::ORDER_CREATED, &created_event(order_id, 1, 3))
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CREATED).await;

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.reserved_qty, 0, "a cancelled order must not hold stock");
}

#[tokio::test]
async fn duplicate_order_paid_confirms_once() {
    let (bus, store) = setup(&[(1, 10)]).await;
    let order_id = OrderId::new();

    bus::publish_json(&bus, topics::ORDER_CREATED, &created_event(order_id, 1, 4))
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CREATED).await;

    let paid = OrderPaid {
        order_id,
        items: vec![QuantityLine {
            book_id: BookId::new(1),
            qty: 4,
        }],
    };
    // At-least-once: the same signal arrives twice.
    bus::publish_json(&bus, topics::ORDER_PAID, &paid).await.unwrap();
    bus::publish_json(&bus, topics::ORDER_PAID, &paid).await.unwrap();
    drained(&bus, topics::ORDER_PAID).await;

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.total_qty, 6, "confirm must apply exactly once");
    assert_eq!(level.reserved_qty, 0);
}

#[tokio::test]
async fn duplicate_order_cancelled_releases_once() {
    let (bus, store) = setup(&[(1, 10)]).await;
    let order_id = OrderId::new();

    bus::publish_json(&bus, topics::ORDER_CREATED, &created_event(order_id, 1, 4))
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CREATED).await;

    let cancelled = messages::OrderCancelled {
        order_id,
        items: vec![QuantityLine {
            book_id: BookId::new(1),
            qty: 4,
        }],
    };
    bus::publish_json(&bus, topics::ORDER_CANCELLED, &cancelled)
        .await
        .unwrap();
    bus::publish_json(&bus, topics::ORDER_CANCELLED, &cancelled)
        .await
        .unwrap();
    drained(&bus, topics::ORDER_CANCELLED).await;

    let level = store.level(BookId::new(1)).await.unwrap().unwrap();
    assert_eq!(level.total_qty, 10);
    assert_eq!(level.reserved_qty, 0, "release applied once, floored once");
}
