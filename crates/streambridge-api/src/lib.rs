//! StreamBridge REST API.
//!
//! HTTP/JSON boundary over the session lifecycle manager: create consumer
//! sessions, poll buffered records, commit offsets, and delete sessions,
//! all without speaking the broker's wire protocol.

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Json, Router,
};
use streambridge_core::SessionManager;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;

pub mod handlers;
pub mod models;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    /// Advertised base (scheme://host:port) used to build `base_uri` values
    /// in create responses.
    pub base_uri: String,
}

/// Create the API router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/consumers/:group", post(handlers::consumers::create_consumer))
        .route(
            "/consumers/:group/instances/:instance/topics/:topic",
            get(handlers::consumers::get_messages),
        )
        .route(
            "/consumers/:group/instances/:instance/offsets",
            post(handlers::consumers::commit_offsets),
        )
        .route(
            "/consumers/:group/instances/:instance/offsets/:topic/:partition",
            get(handlers::consumers::get_offset),
        )
        .route(
            "/consumers/:group/instances/:instance",
            delete(handlers::consumers::delete_consumer),
        )
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Start the API server.
pub async fn serve(router: Router, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("🚀 StreamBridge REST API listening on {}", addr);
    tracing::info!("   Health:  http://{}/health", addr);
    tracing::info!("   OpenAPI: http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}

/// OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::consumers::create_consumer,
        handlers::consumers::get_messages,
        handlers::consumers::commit_offsets,
        handlers::consumers::get_offset,
        handlers::consumers::delete_consumer,
        handlers::health::health_check,
    ),
    components(schemas(
        models::AutoOffsetReset,
        models::CreateConsumerRequest,
        models::CreateConsumerResponse,
        models::ConsumedRecord,
        models::OffsetInfo,
        models::HealthResponse,
        models::ErrorResponse,
    )),
    tags(
        (name = "consumers", description = "Consumer session lifecycle"),
        (name = "health", description = "Health checks"),
    ),
    info(
        title = "StreamBridge API",
        version = "0.1.0",
        description = "REST proxy for consuming from a log/message broker"
    )
)]
struct ApiDoc;
