//! Signaling service entry point.
//!
//! WebSocket gateway for real-time translator matching and call
//! signaling.

use anyhow::Result;
use external_services::{
    HttpPaymentService, HttpRecordStore, LogNotifier, MemoryPaymentService, MemoryRecordStore,
    Notifier, PaymentService, RecordStore,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use signaling::{
    create_router, spawn_stale_sweeper, AppState, ClientRegistry, MatchConfig, MatchingEngine,
    PresenceRegistry, RoomStore, SignalingRelay,
};
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting signaling service");

    // Read configuration from environment
    let http_port: u16 = env::var("HTTP_PORT")
        .unwrap_or_else(|_| "8082".to_string())
        .parse()
        .expect("HTTP_PORT must be a number");
    let metrics_port: u16 = env::var("METRICS_PORT")
        .unwrap_or_else(|_| "9093".to_string())
        .parse()
        .expect("METRICS_PORT must be a number");
    let accept_window_secs: u64 = env::var("ACCEPT_WINDOW_SECS")
        .unwrap_or_else(|_| "60".to_string())
        .parse()
        .expect("ACCEPT_WINDOW_SECS must be a number");
    let record_store_url = env::var("RECORD_STORE_URL").ok();
    let payment_service_url = env::var("PAYMENT_SERVICE_URL").ok();

    info!("Configuration:");
    info!("  HTTP_PORT: {}", http_port);
    info!("  METRICS_PORT: {}", metrics_port);
    info!("  ACCEPT_WINDOW_SECS: {}", accept_window_secs);
    info!("  RECORD_STORE_URL: {:?}", record_store_url);
    info!("  PAYMENT_SERVICE_URL: {:?}", payment_service_url);

    // Start Prometheus metrics server
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], metrics_port))
        .install()
        .expect("Failed to start Prometheus exporter");
    info!("Prometheus metrics server started on port {}", metrics_port);

    // Wire up collaborators
    let records: Arc<dyn RecordStore> = match &record_store_url {
        Some(url) => Arc::new(HttpRecordStore::new(url.clone())),
        None => {
            warn!("RECORD_STORE_URL not set, using in-memory record store");
            Arc::new(MemoryRecordStore::new())
        }
    };
    let payments: Arc<dyn PaymentService> = match &payment_service_url {
        Some(url) => Arc::new(HttpPaymentService::new(url.clone())),
        None => {
            warn!("PAYMENT_SERVICE_URL not set, using in-memory payment service");
            Arc::new(MemoryPaymentService::new())
        }
    };
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier::new());

    // Core state
    let registry = Arc::new(ClientRegistry::new());
    let presence = Arc::new(PresenceRegistry::new());
    let rooms = Arc::new(RoomStore::new());

    let engine = Arc::new(MatchingEngine::new(
        presence.clone(),
        rooms.clone(),
        registry.clone(),
        records.clone(),
        payments,
        notifier,
        MatchConfig {
            accept_window: Duration::from_secs(accept_window_secs),
            ..MatchConfig::default()
        },
    ));
    let relay = Arc::new(SignalingRelay::new(rooms.clone(), registry.clone()));

    let state = Arc::new(AppState {
        registry,
        presence,
        rooms,
        engine,
        relay,
        records,
    });

    // Reap connections whose pings stopped arriving
    spawn_stale_sweeper(state.clone());

    // Create HTTP router
    let app = create_router(state);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let listener = TcpListener::bind(addr).await?;
    info!("Signaling service listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Signaling service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
