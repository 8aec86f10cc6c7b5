//! Startup helpers for the conversation service binary.

use std::process::ExitCode;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    init_tracing();

    tracing::info!("Starting conversation service v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(serve(config)) {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Install the global `tracing` subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

/// Load and validate configuration from the environment.
///
/// # Errors
/// Returns an error if a variable is malformed or the result is inconsistent.
pub fn load_config() -> crate::config::ConfigResult<ServiceConfig> {
    let config = ServiceConfig::from_env()?;
    config.validate()?;
    tracing::info!(
        port = config.server.port,
        backend = %config.storage.backend,
        timeout_ms = config.storage.operation_timeout_ms,
        "configuration loaded"
    );
    Ok(config)
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if the storage backend cannot be opened.
pub async fn initialize(
    config: &ServiceConfig,
) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    AppState::from_config(&config.storage)
        .await
        .map_err(|e| format!("Failed to create state: {e}").into())
}

async fn serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = initialize(&config).await?;
    server::run_server(state, config.server.port, shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
