//! HTTP server for the conversation API.
//!
//! Provides REST endpoints for:
//! - Listing, fetching, and starting conversations
//! - Appending and listing messages

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Router with the cross-origin and request-tracing layers applied.
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve the API on every interface at `port` until `shutdown_signal`
/// completes. In-flight requests finish; new connections are refused.
///
/// # Errors
/// Returns an error if the listener cannot bind or serving fails.
pub async fn run_server<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "conversation service listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    tracing::info!("conversation service stopped");
    Ok(())
}
