//! Demo entry point: runs every saga participant in one process and
//! pushes a sample order through the full choreography.

use std::sync::Arc;

use app::{Config, Services};
use common::{Money, ProductId, UserId};
use contract::OrderLine;
use event_bus::{InMemoryEventBus, RetryPolicy};
use notification::LogNotifier;
use order::OrderRepository;
use product::StockLedger;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

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
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let _metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire every participant onto one bus
    let config = Config::from_env();
    let bus = InMemoryEventBus::with_options(config.bus_partitions, RetryPolicy::default());
    let services = Services::start(bus, Arc::new(LogNotifier::new()))
        .await
        .expect("failed to subscribe participants");

    let reaper = Arc::new(services.reaper(config.saga_timeout, config.reaper_interval));
    let reaper_task = reaper.spawn();

    // 4. Seed stock and run one order through the saga
    let shirt = ProductId::new();
    let mug = ProductId::new();
    services.stock.set(shirt, 5).await.expect("seed stock");
    services.stock.set(mug, 3).await.expect("seed stock");

    let items = vec![
        OrderLine::new(shirt, 2, Money::from_dollars(20)),
        OrderLine::new(mug, 1, Money::from_dollars(5)),
    ];
    let total = items.iter().map(OrderLine::total).sum();
    let order = services
        .saga
        .create_order_saga(UserId::new(), items, total)
        .await
        .expect("failed to start saga");

    services.bus.wait_until_idle().await;
    match services.orders.get(order.id).await.expect("load order") {
        Some(settled) => tracing::info!(order_id = %order.id, status = %settled.status, "demo saga settled"),
        None => tracing::error!(order_id = %order.id, "demo order vanished"),
    }

    // 5. Keep consuming until asked to stop
    shutdown_signal().await;
    reaper_task.abort();
    services.bus.shutdown().await;
    tracing::info!("all participants drained, shut down gracefully");
}
