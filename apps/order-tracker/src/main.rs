//! Order Tracker Binary
//!
//! Starts the order lifecycle tracker.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-tracker
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `VENUE_WS_URL`: WebSocket URL of the venue's streaming API
//!
//! ## Optional
//! - `VENUE_CHANNELS`: Comma-separated channel list (default: user.orders)
//! - `ORDER_TRACKER_RECONNECT_DELAY_MS`: Delay between reconnects (default: 3000)
//! - `ORDER_TRACKER_MAX_RECONNECT_ATTEMPTS`: Reconnect budget (default: 5)
//! - `ORDER_TRACKER_RECENT_UPDATES_CAPACITY`: Recent-updates feed size (default: 256)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context as _;
use order_tracker::infrastructure::telemetry;
use order_tracker::infrastructure::venue::transport::{
    TransportConfig, TransportEvent, VenueTransport,
};
use order_tracker::{OrderRegistry, TrackerConfig, VenueCommandClient};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Transport event channel depth.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting order tracker");

    let config = TrackerConfig::from_env().context("failed to load configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Build the transport and its command path
    let transport_config = TransportConfig {
        url: config.venue.url.clone(),
        channels: config.venue.channels.clone(),
        reconnect: config.websocket.reconnect_config(),
    };
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(EVENT_CHANNEL_CAPACITY);
    let (transport, transport_handle, command_sender) =
        VenueTransport::new(transport_config, event_tx, shutdown_token.clone());

    // Registry driven by the command client
    let command_client = Arc::new(VenueCommandClient::new(command_sender));
    let registry = Arc::new(OrderRegistry::with_recent_capacity(
        command_client,
        config.registry.recent_updates_capacity,
    ));

    // Spawn the event pump feeding transport events into the registry
    let pump_registry = Arc::clone(&registry);
    let pump = tokio::spawn(async move {
        handle_transport_events(event_rx, pump_registry).await;
    });

    // Spawn the transport
    let runner = tokio::spawn(async move {
        if let Err(e) = transport.run().await {
            tracing::error!(error = %e, "venue transport error");
        }
    });

    tracing::info!("Order tracker ready");

    await_shutdown(shutdown_token).await;
    transport_handle.disconnect();

    let _ = runner.await;
    let _ = pump.await;

    tracing::info!("Order tracker stopped");
    Ok(())
}

/// Apply transport events to the registry.
async fn handle_transport_events(
    mut rx: mpsc::Receiver<TransportEvent>,
    registry: Arc<OrderRegistry>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            TransportEvent::Connected => {
                tracing::info!("venue stream connected");
            }
            TransportEvent::Disconnected => {
                tracing::warn!("venue stream disconnected");
            }
            TransportEvent::Reconnecting { attempt } => {
                tracing::info!(attempt, "venue stream reconnecting");
            }
            TransportEvent::OrderUpdate(update) => {
                registry.apply_update(*update);
            }
            TransportEvent::ConnectionExhausted => {
                tracing::error!("venue stream gave up reconnecting, order state is frozen");
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &TrackerConfig) {
    tracing::info!(
        url = %config.venue.url,
        channels = ?config.venue.channels,
        reconnect_delay_ms = config.websocket.reconnect_delay.as_millis(),
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
