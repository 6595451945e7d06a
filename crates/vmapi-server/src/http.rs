//! HTTP transport.
//!
//! ## Endpoints
//!
//! - `POST /vms` - Create a VM
//! - `DELETE /vms/:id` - Delete a VM
//! - `GET /vms/:id/status` - VM status
//! - `GET /health` - Health check (when enabled)

use crate::handlers::{self, AppState};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the HTTP router.
///
/// The returned router can be served directly with axum or composed
/// into a larger application.
pub fn build_router(orchestrator: AppState, healthcheck: bool) -> Router {
    tracing::debug!(healthcheck, "Building HTTP router");

    let mut router: Router<AppState> = Router::new()
        .route("/vms", post(handlers::create_vm))
        .route("/vms/:id", delete(handlers::delete_vm))
        .route("/vms/:id/status", get(handlers::vm_status));

    if healthcheck {
        router = router.route("/health", get(handlers::health));
    }

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

/// Start the HTTP server.
///
/// Runs until `shutdown` resolves, then stops accepting connections and
/// waits for in-flight requests.
pub async fn serve(
    router: Router,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    tracing::info!(%addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::debug!(%addr, "TCP listener bound");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
