mod config;
mod logging;
mod services;
mod web;

use std::sync::Arc;

use color_eyre::Result;
use domain::Backend;
use http_adapter::HttpBackend;
use in_memory_adapter::InMemoryBackend;
use tokio::signal::{self, ctrl_c};
use tracing::{error, info, warn};

use config::Config;
use services::ForseerHandle;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = Config::from_env()?;

    // Initialize logging
    logging::init(&config.data_dir)?;
    info!("Starting Forseer web client");
    tracing::debug!("Configuration: {config:#?}");

    let backend: Arc<dyn Backend> = if config.demo {
        warn!("Demo mode: serving the seeded in-memory backend, sign in as demo@forseer.dev");
        Arc::new(InMemoryBackend::seeded())
    } else {
        info!("Using backend at {}", config.api_url);
        Arc::new(HttpBackend::new(&config.api_url)?)
    };

    let state = AppState {
        forseer: ForseerHandle::new(backend),
        cookies: config.cookie_policy(),
    };
    let app = web::create_app(state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Server running on http://{}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
