pub mod access;
pub mod archive;
pub mod config;
pub mod engine;
pub mod entail;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod profiles;
pub mod provenance;
pub mod rdf;
pub mod resolve;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod uplift;

pub use config::{CliArgs, ServerConfig};
pub use error::{ApiError, ErrorKind};
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use server::build_router;
pub use shutdown::ShutdownCoordinator;
pub use state::AppState;

use anyhow::Result;
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::net::TcpListener;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let config = Arc::new(config);
    config.log_summary();

    let state = AppState::new(config.clone())?;
    let router = build_router(state);

    let listener = TcpListener::bind(config.http_bind_address).await?;
    let actual_addr = listener.local_addr()?;
    tracing::info!(
        bind = %actual_addr,
        root_path = %config.root_path,
        service = %config.service_name,
        "listening"
    );

    let coordinator = ShutdownCoordinator::new(config.shutdown_timeout);
    let signal_coordinator = coordinator.clone();
    let server_future = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal_coordinator.wait_for_signal().await;
        })
        .into_future();

    match coordinator.drain(server_future).await {
        Some(result) => {
            tracing::info!("server stopped");
            result.map_err(anyhow::Error::from)
        }
        None => Ok(()),
    }
}
