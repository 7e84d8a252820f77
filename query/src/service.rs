use std::time::Duration;

use proto::result::v1::{
    GetTotalsRequest, GetTotalsResponse, PingRequest, PingResponse, SubscribeTotalsRequest,
    SubscribeTotalsResponse, result_service_server::ResultService,
};
use redis::Client;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::QueryError;
use crate::totals::Snapshot;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub struct ResultsService {
    pool: PgPool,
    redis: Client,
    channel: String,
}

impl ResultsService {
    /// Pings both stores so a misconfigured deployment fails at startup
    /// rather than on the first request.
    pub async fn new(config: &Config) -> Result<Self, QueryError> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(&config.pg_dsn)
            .await?;

        let redis = Client::open(config.redis_url())?;
        let mut conn = redis.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        Ok(Self {
            pool,
            redis,
            channel: config.results_channel.clone(),
        })
    }
}

#[tonic::async_trait]
impl ResultService for ResultsService {
    async fn ping(
        &self,
        _request: Request<PingRequest>,
    ) -> Result<Response<PingResponse>, Status> {
        Ok(Response::new(PingResponse {
            message: "pong".to_string(),
        }))
    }

    async fn get_totals(
        &self,
        _request: Request<GetTotalsRequest>,
    ) -> Result<Response<GetTotalsResponse>, Status> {
        let snapshot = Snapshot::fetch(&self.pool)
            .await
            .map_err(|err| Status::unavailable(format!("query totals: {err}")))?;

        Ok(Response::new(snapshot.into_get_response()))
    }

    type SubscribeTotalsStream = ReceiverStream<Result<SubscribeTotalsResponse, Status>>;

    /// Streams a snapshot immediately, then again on every refresh signal
    /// and on a heartbeat so idle subscribers still see liveness. The
    /// `tenant` field is informational; the stream is global.
    async fn subscribe_totals(
        &self,
        request: Request<SubscribeTotalsRequest>,
    ) -> Result<Response<Self::SubscribeTotalsStream>, Status> {
        let tenant = request.into_inner().tenant;
        debug!("totals subscription started: tenant={tenant}");

        let pool = self.pool.clone();
        let redis = self.redis.clone();
        let channel = self.channel.clone();

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            if let Err(status) = stream_totals(&pool, &redis, &channel, &tx).await {
                let _ = tx.send(Err(status)).await;
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// Producer side of one subscription. Owns its own pub/sub connection;
/// returning drops it, which tears the Redis subscription down with the
/// client.
async fn stream_totals(
    pool: &PgPool,
    redis: &Client,
    channel: &str,
    tx: &mpsc::Sender<Result<SubscribeTotalsResponse, Status>>,
) -> Result<(), Status> {
    let snapshot = Snapshot::fetch(pool)
        .await
        .map_err(|err| Status::unavailable(format!("query totals: {err}")))?;
    if tx.send(Ok(snapshot.into_subscribe_response())).await.is_err() {
        return Ok(());
    }

    let mut pubsub = redis
        .get_async_pubsub()
        .await
        .map_err(|err| Status::unavailable(format!("results channel connect: {err}")))?;
    pubsub
        .subscribe(channel)
        .await
        .map_err(|err| Status::unavailable(format!("results channel subscribe: {err}")))?;
    let mut messages = pubsub.on_message();

    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            _ = tx.closed() => return Ok(()),
            _ = heartbeat.tick() => {
                if !forward_snapshot(pool, tx).await {
                    return Ok(());
                }
            }
            message = messages.next() => {
                if message.is_none() {
                    return Err(Status::aborted("results channel closed"));
                }
                if !forward_snapshot(pool, tx).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Fetch-and-send one snapshot. A fetch error is logged and the stream
/// stays open; only a failed send (client gone) stops the producer.
async fn forward_snapshot(
    pool: &PgPool,
    tx: &mpsc::Sender<Result<SubscribeTotalsResponse, Status>>,
) -> bool {
    match Snapshot::fetch(pool).await {
        Ok(snapshot) => tx.send(Ok(snapshot.into_subscribe_response())).await.is_ok(),
        Err(err) => {
            warn!("fetch totals error: {err}");
            true
        }
    }
}
