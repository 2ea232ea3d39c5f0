//! Request handlers for the control API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::Value;

use super::AppState;
use crate::models::request::{MessageResponse, StartRequest, SubscribeQuery};
use crate::models::service::Service;
use crate::proxy::DaemonOperation;
use crate::Result;

type Shared = State<Arc<AppState>>;

/// `GET /up`
pub async fn up() -> Json<MessageResponse> {
    Json(MessageResponse::new("up"))
}

/// `POST /run/{name}`: forward an opaque body to the daemon's `/run`.
pub async fn run(
    State(state): Shared,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let reply = state
        .proxy
        .dispatch(DaemonOperation::Run, &name, body.to_vec())
        .await?;
    Ok(Json(MessageResponse::new(reply)))
}

/// `POST /checkpoint/{name}`: forward a checkpoint request to the daemon.
pub async fn checkpoint(
    State(state): Shared,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<MessageResponse>> {
    let reply = state
        .proxy
        .dispatch(DaemonOperation::Checkpoint, &name, body.to_vec())
        .await?;
    Ok(Json(MessageResponse::new(reply)))
}

/// `POST /subscribe?container_name=..&container_id=..&image=..&daemon_port=..`
pub async fn subscribe(
    State(state): Shared,
    Query(query): Query<SubscribeQuery>,
) -> Result<Json<MessageResponse>> {
    state
        .lifecycle
        .subscribe(
            &query.container_name,
            &query.container_id,
            &query.image,
            query.daemon_port,
        )
        .await?;
    Ok(Json(MessageResponse::new(format!(
        "service '{}' subscribed",
        query.container_name
    ))))
}

/// `POST /unsubscribe/{name}`
pub async fn unsubscribe(
    State(state): Shared,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.lifecycle.unsubscribe(&name).await?;
    Ok(Json(MessageResponse::new(format!(
        "service '{name}' unsubscribed"
    ))))
}

/// `POST /start`
pub async fn start(
    State(state): Shared,
    Json(request): Json<StartRequest>,
) -> Result<Json<MessageResponse>> {
    let service = state.lifecycle.start(&request).await?;
    Ok(Json(MessageResponse::new(format!(
        "service '{}' started ({})",
        service.name, service.status
    ))))
}

/// `POST /stop/{name}`
pub async fn stop(
    State(state): Shared,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.lifecycle.stop(&name).await?;
    Ok(Json(MessageResponse::new(format!("service '{name}' stopped"))))
}

/// `DELETE /remove/{name}`
pub async fn remove(
    State(state): Shared,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.lifecycle.remove(&name).await?;
    Ok(Json(MessageResponse::new(format!("service '{name}' removed"))))
}

/// `GET /service/container_info/{name}`
pub async fn container_info(
    State(state): Shared,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    Ok(Json(state.lifecycle.container_info(&name).await?))
}

/// `GET /service/{name}`: the service with a freshly resolved status.
pub async fn service(State(state): Shared, Path(name): Path<String>) -> Result<Json<Service>> {
    Ok(Json(state.lifecycle.resolve_status(&name).await?))
}

/// `GET /service`
pub async fn services(State(state): Shared) -> Json<Vec<Service>> {
    Json(state.lifecycle.resolve_all().await)
}
