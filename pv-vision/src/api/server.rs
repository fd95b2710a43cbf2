//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::hub::{BroadcastHub, HubSender};
use crate::session::SessionController;
use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub controller: Arc<SessionController>,
    pub hub: Arc<BroadcastHub>,
    /// Producer handle used by connection tasks for ordered unregistration
    pub sender: HubSender,
}

/// Router with every route and layer attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/", get(super::ws::ws_handler))
        .route("/ws", get(super::ws::ws_handler))
        .route("/health", get(super::handlers::health))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve until `shutdown` resolves
pub async fn run<F>(bind: &str, port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::Config(format!("Failed to bind to {}: {}", addr, e)))?;
    info!("Session WebSocket listening on ws://{}/ws", addr);

    axum::serve(listener, build_router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
