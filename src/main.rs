use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use driver_agent::api;
use driver_agent::backend::{DispatchBackend, HttpBackend, MockBackend};
use driver_agent::config::Config;
use driver_agent::engine::runtime::run_driver_runtime;
use driver_agent::error::AppError;
use driver_agent::models::driver::GeoPoint;
use driver_agent::session::SessionStore;
use driver_agent::state::AppState;

// Harare CBD
const DEMO_CENTER: GeoPoint = GeoPoint {
    lat: -17.8292,
    lng: 31.0522,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let session = Arc::new(SessionStore::load(&config.session_file)?);

    let backend: Arc<dyn DispatchBackend> = match &config.backend_url {
        Some(url) => {
            tracing::info!(backend_url = %url, "using dispatch backend");
            Arc::new(HttpBackend::new(
                url.clone(),
                config.request_timeout,
                session.clone(),
            )?)
        }
        None => {
            tracing::warn!("BACKEND_URL not set; serving demo offers from memory");
            Arc::new(MockBackend::demo(DEMO_CENTER))
        }
    };

    let http_port = config.http_port;
    let (app_state, command_rx) = AppState::new(config, backend, session);
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_driver_runtime(shared_state.clone(), command_rx));

    let bind_addr = format!("0.0.0.0:{http_port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
