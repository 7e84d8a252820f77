use tokio::signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use worker::{config::Config, processor::Processor};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = Config::load();
    info!(
        "worker starting: stream={} group={} consumer={} batch={} bucket={}",
        config.redis_stream,
        config.redis_group,
        config.redis_consumer,
        config.batch_size,
        config.totals_bucket_id
    );

    let mut processor = match Processor::new(config).await {
        Ok(processor) => processor,
        Err(err) => {
            error!("initialise worker: {err}");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let loop_token = shutdown.clone();
    let handle = tokio::spawn(async move { processor.run(loop_token).await });

    shutdown_signal().await;
    info!("shutdown signal received");
    shutdown.cancel();

    match handle.await {
        Ok(Ok(())) => info!("worker stopped"),
        Ok(Err(err)) => error!("worker stopped with error: {err}"),
        Err(err) => error!("worker task failed: {err}"),
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
