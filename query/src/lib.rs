//! Totals query and subscription service.
//!
//! Serves point-in-time totals snapshots from the aggregate store and
//! long-lived subscription streams that re-fetch whenever the worker
//! publishes a refresh. The pub/sub signal carries no payload; the store is
//! always the authoritative source.
use std::time::Duration;

use proto::result::v1::result_service_server::ResultServiceServer;
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{signal, sync::oneshot, time::timeout};
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod service;
pub mod totals;

use config::Config;
use service::ResultsService;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load();
    let addr = config.listen_addr();

    let service = match ResultsService::new(&config).await {
        Ok(service) => service,
        Err(err) => {
            error!("startup failed: {err}");
            std::process::exit(1);
        }
    };

    let addr = addr.parse().expect("Invalid GRPC_ADDR!");
    info!("result query gRPC listening on {addr}");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(
        Server::builder()
            .add_service(ResultServiceServer::new(service))
            .serve_with_shutdown(addr, async {
                let _ = stop_rx.await;
            }),
    );

    shutdown_signal().await;
    info!("shutdown initiated");
    let _ = stop_tx.send(());

    // In-flight RPCs get a grace period; subscription streams can outlive
    // it, so force-stop afterwards.
    match timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Ok(()))) => info!("gRPC server stopped gracefully"),
        Ok(Ok(Err(err))) => error!("gRPC server error: {err}"),
        Ok(Err(err)) => error!("gRPC server task failed: {err}"),
        Err(_) => warn!("force stopping gRPC server"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
