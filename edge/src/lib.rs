//! Edge API.
//!
//! Fronts the gRPC query service for browsers: plain JSON for one-shot
//! totals reads and server-sent events for the live subscription stream.
use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal, sync::oneshot, time::timeout};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod payload;
pub mod routes;
pub mod state;

use routes::{health_handler, results_handler, stream_handler};
use state::State;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = State::new();

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/api/v1/results", get(results_handler))
        .route("/api/v1/results/stream", get(stream_handler))
        .route("/healthz", get(health_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = state.config.listen_addr();
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    info!("Server shutting down...");
    let _ = stop_tx.send(());

    // Open SSE responses can outlive any grace period; force-stop after it.
    match timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => info!("Server stopped"),
        Ok(Ok(Err(err))) => error!("server error: {err}"),
        Ok(Err(err)) => error!("server task failed: {err}"),
        Err(_) => warn!("force stopping server"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
