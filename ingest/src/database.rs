//! Store clients for the ingest API.
//!
//! Redis carries the durable vote stream; Postgres holds the aggregates the
//! worker maintains. The API only ever appends to the stream and reads the
//! summed totals view.
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::routes::{CandidateTotal, TotalsResponse, VoteRequest};

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url).unwrap();

    client
        .get_connection_manager_with_config(config)
        .await
        .expect("Redis unreachable!")
}

pub async fn init_pg(pg_dsn: &str) -> PgPool {
    PgPoolOptions::new()
        .max_connections(8)
        .connect(pg_dsn)
        .await
        .expect("Postgres unreachable!")
}

/// Appends one vote event to the stream. The stream-assigned id is not
/// surfaced to callers.
pub async fn append_vote(
    redis: &mut ConnectionManager,
    stream: &str,
    request: &VoteRequest,
) -> Result<(), redis::RedisError> {
    let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);

    let _: String = redis
        .xadd(
            stream,
            "*",
            &[
                ("user_id", request.user_id.to_string()),
                ("candidate_id", request.candidate_id.to_string()),
                ("ts", ts),
            ],
        )
        .await?;

    Ok(())
}

/// Reads the logical totals: shard counters summed per candidate, ascending
/// by candidate id, plus the most recent vote timestamp.
pub async fn fetch_totals(pool: &PgPool) -> Result<TotalsResponse, sqlx::Error> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT candidate_id, SUM(cnt)::BIGINT
         FROM totals_sharded
         GROUP BY candidate_id
         ORDER BY candidate_id",
    )
    .fetch_all(pool)
    .await?;

    let updated_at: DateTime<Utc> =
        sqlx::query_scalar("SELECT COALESCE(MAX(voted_at), NOW()) FROM votes")
            .fetch_one(pool)
            .await?;

    Ok(TotalsResponse {
        totals: rows
            .into_iter()
            .map(|(candidate_id, count)| CandidateTotal {
                candidate_id,
                count,
            })
            .collect(),
        updated_at,
    })
}
