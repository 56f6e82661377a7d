//! Consumer session endpoints.
//!
//! ## Endpoints
//!
//! - `POST /consumers/{group}` - Create a consumer session
//! - `GET /consumers/{group}/instances/{instance}/topics/{topic}` - Poll buffered records
//! - `POST /consumers/{group}/instances/{instance}/offsets` - Commit offsets
//! - `GET /consumers/{group}/instances/{instance}/offsets/{topic}/{partition}` - Read committed offset
//! - `DELETE /consumers/{group}/instances/{instance}` - Delete a session

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, info};

use streambridge_core::ProxyError;

use crate::models::{
    ConsumedRecord, CreateConsumerRequest, CreateConsumerResponse, ErrorResponse, OffsetInfo,
};
use crate::AppState;

/// Translate a proxy error into its HTTP representation.
fn error_response(err: ProxyError) -> Response {
    let (status, code) = match &err {
        ProxyError::Conflict(_) => (StatusCode::CONFLICT, "CONSUMER_EXISTS"),
        ProxyError::SessionNotFound(_) | ProxyError::NoActiveBinding(_) => {
            (StatusCode::NOT_FOUND, "CONSUMER_NOT_FOUND")
        }
        ProxyError::TopicNotFound(_) => (StatusCode::NOT_FOUND, "TOPIC_NOT_FOUND"),
        ProxyError::BindingCreation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "BINDING_CREATION_FAILED")
        }
        ProxyError::CommitFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMIT_FAILED"),
        ProxyError::Transport(_) => (StatusCode::BAD_GATEWAY, "BROKER_UNAVAILABLE"),
    };
    (status, Json(ErrorResponse::new(code, err.to_string()))).into_response()
}

#[utoipa::path(
    post,
    path = "/consumers/{group}",
    params(("group" = String, Path, description = "Consumer group name")),
    request_body = CreateConsumerRequest,
    responses(
        (status = 200, description = "Session created", body = CreateConsumerResponse),
        (status = 409, description = "Session already exists", body = ErrorResponse)
    ),
    tag = "consumers"
)]
pub async fn create_consumer(
    State(state): State<AppState>,
    Path(group): Path<String>,
    body: Option<Json<CreateConsumerRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    debug!(group = %group, "new consumer requested");

    match state.manager.create_session(&group, request.into_options()).await {
        Ok(session) => {
            let base_uri = format!(
                "{}/consumers/{}/instances/{}",
                state.base_uri, session.group, session.instance_id
            );
            let response = CreateConsumerResponse {
                instance_id: session.instance_id.clone(),
                base_uri,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/consumers/{group}/instances/{instance}/topics/{topic}",
    params(
        ("group" = String, Path, description = "Consumer group name"),
        ("instance" = String, Path, description = "Consumer instance id"),
        ("topic" = String, Path, description = "Topic to poll")
    ),
    responses(
        (status = 200, description = "Buffered records, oldest first", body = [ConsumedRecord]),
        (status = 404, description = "Unknown consumer or topic", body = ErrorResponse)
    ),
    tag = "consumers"
)]
pub async fn get_messages(
    State(state): State<AppState>,
    Path((group, instance, topic)): Path<(String, String, String)>,
) -> Response {
    match state.manager.get_messages(&group, &instance, &topic).await {
        Ok(records) => {
            let records: Vec<ConsumedRecord> = records.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(records)).into_response()
        }
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    post,
    path = "/consumers/{group}/instances/{instance}/offsets",
    params(
        ("group" = String, Path, description = "Consumer group name"),
        ("instance" = String, Path, description = "Consumer instance id")
    ),
    responses(
        (status = 200, description = "Offsets committed"),
        (status = 404, description = "Unknown consumer or no active binding", body = ErrorResponse),
        (status = 500, description = "Broker rejected the commit", body = ErrorResponse)
    ),
    tag = "consumers"
)]
pub async fn commit_offsets(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> Response {
    match state.manager.commit_offsets(&group, &instance).await {
        Ok(()) => (StatusCode::OK, Json(json!([]))).into_response(),
        Err(e) => error_response(e),
    }
}

#[utoipa::path(
    get,
    path = "/consumers/{group}/instances/{instance}/offsets/{topic}/{partition}",
    params(
        ("group" = String, Path, description = "Consumer group name"),
        ("instance" = String, Path, description = "Consumer instance id"),
        ("topic" = String, Path, description = "Topic name"),
        ("partition" = u32, Path, description = "Partition id")
    ),
    responses(
        (status = 200, description = "Committed offset (best effort)", body = OffsetInfo),
        (status = 404, description = "Unknown consumer", body = ErrorResponse)
    ),
    tag = "consumers"
)]
pub async fn get_offset(
    State(state): State<AppState>,
    Path((group, instance, topic, partition)): Path<(String, String, String, u32)>,
) -> Response {
    if state.manager.registry().lookup(&group, &instance).await.is_none() {
        return error_response(ProxyError::SessionNotFound(format!("{group}/{instance}")));
    }

    let offset = state.manager.lookup_offset(&group, &topic, partition).await;
    let info = OffsetInfo {
        group,
        topic,
        partition,
        offset,
    };
    (StatusCode::OK, Json(info)).into_response()
}

#[utoipa::path(
    delete,
    path = "/consumers/{group}/instances/{instance}",
    params(
        ("group" = String, Path, description = "Consumer group name"),
        ("instance" = String, Path, description = "Consumer instance id")
    ),
    responses(
        (status = 200, description = "Session deleted"),
        (status = 404, description = "Unknown consumer", body = ErrorResponse)
    ),
    tag = "consumers"
)]
pub async fn delete_consumer(
    State(state): State<AppState>,
    Path((group, instance)): Path<(String, String)>,
) -> Response {
    match state.manager.delete_session(&group, &instance).await {
        Ok(()) => {
            info!(group = %group, instance = %instance, "consumer deleted via REST API");
            (StatusCode::OK, Json(json!({}))).into_response()
        }
        Err(e) => error_response(e),
    }
}
