//! HTTP control API.
//!
//! Every route lives under [`API_PREFIX`]. Handlers are thin: they parse
//! the request, call into the lifecycle controller or the command proxy,
//! and let [`AppError`](crate::AppError) render failures.

pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use crate::config::GlobalConfig;
use crate::orchestrator::lifecycle::LifecycleController;
use crate::proxy::CommandProxy;
use crate::{AppError, Result};

/// Path prefix of the control API.
pub const API_PREFIX: &str = "/cm_controller/v1";

/// State shared by all handlers.
pub struct AppState {
    /// Merged configuration.
    pub config: Arc<GlobalConfig>,
    /// Lifecycle controller.
    pub lifecycle: Arc<LifecycleController>,
    /// Daemon command forwarder.
    pub proxy: CommandProxy,
}

/// Build the control API router.
pub fn router(state: Arc<AppState>) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let api = Router::new()
        .route("/up", get(handlers::up))
        .route("/run/{name}", post(handlers::run))
        .route("/checkpoint/{name}", post(handlers::checkpoint))
        .route("/subscribe", post(handlers::subscribe))
        .route("/unsubscribe/{name}", post(handlers::unsubscribe))
        .route("/start", post(handlers::start))
        .route("/stop/{name}", post(handlers::stop))
        .route("/remove/{name}", delete(handlers::remove))
        .route(
            "/service/container_info/{name}",
            get(handlers::container_info),
        )
        .route("/service/{name}", get(handlers::service))
        .route("/service", get(handlers::services));

    Router::new()
        .nest(API_PREFIX, api)
        .layer(trace_layer)
        .with_state(state)
}

/// Serve the control API on the configured address until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound,
/// and `AppError::Io` if the server fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.bind_address, state.config.http_port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid bind address: {err}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, prefix = API_PREFIX, "control API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("control API server error: {err}")))?;

    info!("control API shut down");
    Ok(())
}
