//! HTTP gateway for the bookstore order saga.
//!
//! Exposes order, inventory, and payment endpoints over axum, with
//! structured logging (tracing) and Prometheus metrics. The default
//! wiring runs all three services in-process over the in-memory bus;
//! `DATABASE_URL` switches the stores to Postgres.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use bus::MemoryBus;
use common::BookId;
use inventory::{InventoryConsumer, MemoryProcessedLedger, MemoryStockStore, StockStore};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{
    CartClient, MemoryCartClient, MemoryOrderStore, OrderConsumer, OrderService, OrderStore,
    ReleasePolicy,
};
use payment::{FakeProvider, MemoryPaymentStore, PaymentConsumer, PaymentStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// The in-memory wiring used by the default binary and the tests.
pub type MemoryAppState =
    AppState<MemoryOrderStore, MemoryCartClient, MemoryStockStore, MemoryPaymentStore>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<O, C, I, P>(
    state: Arc<AppState<O, C, I, P>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    O: OrderStore + 'static,
    C: CartClient + 'static,
    I: StockStore + 'static,
    P: PaymentStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<O, C, I, P>))
        .route("/orders/{id}", get(routes::orders::get::<O, C, I, P>))
        .route(
            "/orders/{id}/cancel",
            post(routes::orders::cancel::<O, C, I, P>),
        )
        .route(
            "/inventory/availability",
            get(routes::inventory::availability::<O, C, I, P>),
        )
        .route(
            "/payments/{order_id}",
            get(routes::payments::get::<O, C, I, P>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the three services over one in-memory bus and starts their
/// consumers. Returns the shared state plus the bus, which tests use to
/// inject deliveries and drive redelivery.
pub async fn create_default_state(config: &Config) -> bus::Result<(Arc<MemoryAppState>, MemoryBus)> {
    let bus = MemoryBus::new();

    let stock = Arc::new(MemoryStockStore::new());
    let order_store = Arc::new(MemoryOrderStore::new());
    let payments = Arc::new(MemoryPaymentStore::new());
    let cart = Arc::new(MemoryCartClient::new());

    InventoryConsumer::new(stock.clone(), Arc::new(MemoryProcessedLedger::new()), bus.clone())
        .start()
        .await?;
    OrderConsumer::new(order_store.clone(), bus.clone())
        .with_policy(ReleasePolicy {
            release_on_payment_failure: config.release_on_payment_failure,
        })
        .start()
        .await?;
    PaymentConsumer::new(payments.clone(), Arc::new(FakeProvider::new()), bus.clone())
        .start()
        .await?;

    let orders = OrderService::new(order_store, cart.clone(), bus.clone())
        .with_cart_timeout(config.cart_timeout);

    let state = Arc::new(AppState {
        orders,
        cart,
        stock,
        payments,
    });
    Ok((state, bus))
}

/// The Postgres wiring selected by `DATABASE_URL`.
///
/// The cart service stays in-memory: it is an external collaborator this
/// deployment only stubs.
pub type PostgresAppState = AppState<
    orders::PostgresOrderStore,
    MemoryCartClient,
    inventory::PostgresStockStore,
    payment::PostgresPaymentStore,
>;

/// Wires the three services against Postgres stores over one in-memory
/// bus and starts their consumers. Migrations must already have run.
pub async fn create_postgres_state(
    config: &Config,
    pool: sqlx::PgPool,
) -> bus::Result<(Arc<PostgresAppState>, MemoryBus)> {
    let bus = MemoryBus::new();

    let stock = Arc::new(inventory::PostgresStockStore::new(pool.clone()));
    let order_store = Arc::new(orders::PostgresOrderStore::new(pool.clone()));
    let payments = Arc::new(payment::PostgresPaymentStore::new(pool.clone()));
    let cart = Arc::new(MemoryCartClient::new());

    InventoryConsumer::new(
        stock.clone(),
        Arc::new(inventory::PostgresProcessedLedger::new(pool)),
        bus.clone(),
    )
    .start()
    .await?;
    OrderConsumer::new(order_store.clone(), bus.clone())
        .with_policy(ReleasePolicy {
            release_on_payment_failure: config.release_on_payment_failure,
        })
        .start()
        .await?;
    PaymentConsumer::new(payments.clone(), Arc::new(FakeProvider::new()), bus.clone())
        .start()
        .await?;

    let orders = OrderService::new(order_store, cart.clone(), bus.clone())
        .with_cart_timeout(config.cart_timeout);

    let state = Arc::new(AppState {
        orders,
        cart,
        stock,
        payments,
    });
    Ok((state, bus))
}

/// Initial shelf contents for the in-memory demo wiring.
pub async fn seed_demo_stock(stock: &MemoryStockStore) -> inventory::Result<()> {
    stock
        .seed(&[
            (BookId::new(1), 10),
            (BookId::new(2), 5),
            (BookId::new(3), 3),
        ])
        .await
}
