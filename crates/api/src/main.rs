//! API server entry point.

use api::config::Config;
use common::{BookId, Money, UserId};
use orders::CartItem;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let app = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to Postgres");
            inventory::PostgresStockStore::new(pool.clone())
                .run_migrations()
                .await
                .expect("migrations failed");
            let (state, _bus) = api::create_postgres_state(&config, pool)
                .await
                .expect("failed to wire services");
            tracing::info!("using Postgres stores");
            api::create_app(state, metrics_handle)
        }
        None => {
            let (state, _bus) = api::create_default_state(&config)
                .await
                .expect("failed to wire services");
            api::seed_demo_stock(&state.stock)
                .await
                .expect("failed to seed stock");

            // Pre-fill one cart so the happy path works out of the box.
            let demo_user = UserId::new();
            state.cart.set_cart(
                demo_user,
                vec![
                    CartItem {
                        book_id: BookId::new(1),
                        title: "The Pragmatic Programmer".to_string(),
                        qty: 1,
                        unit_price: Money::from_cents(2500),
                    },
                    CartItem {
                        book_id: BookId::new(2),
                        title: "Designing Data-Intensive Applications".to_string(),
                        qty: 1,
                        unit_price: Money::from_cents(3500),
                    },
                ],
            );
            tracing::info!(%demo_user, "using in-memory stores; demo cart seeded");
            api::create_app(state, metrics_handle)
        }
    };

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
