//! StreamBridge server.
//!
//! Wires the in-memory broker, the session lifecycle manager, the idle
//! sweeper, and the REST API together and serves until interrupted.
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! - `STREAMBRIDGE_ADDR`: bind address (default: 0.0.0.0:8085)
//! - `STREAMBRIDGE_BASE_URI`: advertised base for `base_uri` responses
//!   (default: http://<bind address>)
//! - `STREAMBRIDGE_TOPICS`: comma-separated topics pre-created on the
//!   in-memory broker (default: none)
//! - `STREAMBRIDGE_PARTITIONS`: partitions per pre-created topic (default: 1)
//! - `STREAMBRIDGE_CONSUMER_TIMEOUT_MS`: idle eviction threshold (default: 60000)
//! - `STREAMBRIDGE_SWEEP_INTERVAL_MS`: sweep interval (default: 10000)
//! - `STREAMBRIDGE_SETTLE_DELAY_MS`: first-access settling delay (default: 1000)
//! - `STREAMBRIDGE_RECOVERY_BACKOFF_MS`: binding recovery backoff (default: 1000)
//!
//! Logging is controlled via `RUST_LOG` (default: info).

use std::sync::Arc;
use std::time::Duration;

use streambridge_api::{create_router, serve, AppState};
use streambridge_broker::{BrokerClient, InMemoryBroker};
use streambridge_core::{IdleSweeper, ManagerConfig, SessionManager};

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    let ms = std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_ms);
    Duration::from_millis(ms)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Configuration
    let addr = std::env::var("STREAMBRIDGE_ADDR").unwrap_or_else(|_| "0.0.0.0:8085".to_string());
    let base_uri =
        std::env::var("STREAMBRIDGE_BASE_URI").unwrap_or_else(|_| format!("http://{}", addr));

    let config = ManagerConfig {
        settle_delay: env_duration_ms("STREAMBRIDGE_SETTLE_DELAY_MS", 1_000),
        recovery_backoff: env_duration_ms("STREAMBRIDGE_RECOVERY_BACKOFF_MS", 1_000),
        idle_timeout: env_duration_ms("STREAMBRIDGE_CONSUMER_TIMEOUT_MS", 60_000),
        sweep_interval: env_duration_ms("STREAMBRIDGE_SWEEP_INTERVAL_MS", 10_000),
        ..Default::default()
    };

    // Broker: in-process for local development; real clients plug in behind
    // the BrokerClient trait.
    let broker = Arc::new(InMemoryBroker::new());
    let partitions: u32 = std::env::var("STREAMBRIDGE_PARTITIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1);
    if let Ok(topics) = std::env::var("STREAMBRIDGE_TOPICS") {
        for topic in topics.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            broker.create_topic(topic, partitions).await;
            tracing::info!(topic, partitions, "pre-created topic on in-memory broker");
        }
    }

    let manager = Arc::new(SessionManager::new(
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
        config,
    ));

    // Idle sweeper
    let sweeper = Arc::new(IdleSweeper::new(Arc::clone(&manager)));
    let (sweeper_shutdown_tx, sweeper_shutdown_rx) = tokio::sync::oneshot::channel();
    let sweeper_handle = sweeper.start(sweeper_shutdown_rx);

    // REST API
    let state = AppState { manager, base_uri };
    let router = create_router(state);
    serve(router, &addr).await?;

    // Stop the sweeper once the server has drained.
    let _ = sweeper_shutdown_tx.send(());
    sweeper_handle.await?;

    Ok(())
}
