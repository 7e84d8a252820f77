//! Stream consumer group driver.
//!
//! One processor owns one consumer identity. The loop block-reads a batch,
//! applies it in a single transaction, acknowledges what was applied, and
//! falls back to reclaiming idle pending entries from crashed peers when the
//! stream is quiet.
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::Config;
use crate::entry::VoteEntry;
use crate::error::WorkerError;

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

const INSERT_VOTE: &str = "INSERT INTO votes (user_id, candidate_id, voted_at)
     VALUES ($1, $2, $3)
     ON CONFLICT (user_id, candidate_id) DO NOTHING";

const BUMP_TOTALS: &str = "INSERT INTO totals_sharded (candidate_id, bucket, cnt)
     VALUES ($1, $2, $3)
     ON CONFLICT (candidate_id, bucket)
     DO UPDATE SET cnt = totals_sharded.cnt + EXCLUDED.cnt";

pub struct Processor {
    cfg: Config,
    redis: ConnectionManager,
    pg: PgPool,
    last_claim: Instant,
}

impl Processor {
    /// Validates connectivity to both stores and ensures the consumer group
    /// exists before the loop starts.
    pub async fn new(cfg: Config) -> Result<Self, WorkerError> {
        let client = Client::open(cfg.redis_url())?;

        let manager_cfg = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_millis(500));

        let mut redis = client.get_connection_manager_with_config(manager_cfg).await?;

        let _: String = redis::cmd("PING").query_async(&mut redis).await?;

        ensure_group(&mut redis, &cfg.redis_stream, &cfg.redis_group).await?;

        let pg = PgPoolOptions::new()
            .max_connections(4)
            .connect(&cfg.pg_dsn)
            .await?;

        Ok(Self {
            cfg,
            redis,
            pg,
            last_claim: Instant::now(),
        })
    }

    /// Runs until the token is cancelled. Recoverable errors are logged and
    /// retried after a short back-off; unacknowledged entries stay pending
    /// and are redelivered.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let read = tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                read = self.read_batch() => read,
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(err) => {
                    warn!("read batch error: {err}");
                    backoff(&shutdown).await;
                    continue;
                }
            };

            if entries.is_empty() {
                if self.cfg.idle_timeout > Duration::ZERO
                    && self.last_claim.elapsed() >= self.cfg.idle_timeout
                {
                    let claimed = match self.claim_idle().await {
                        Ok(claimed) => claimed,
                        Err(err) => {
                            warn!("claim idle error: {err}");
                            backoff(&shutdown).await;
                            continue;
                        }
                    };
                    if claimed.is_empty() {
                        continue;
                    }
                    if let Err(err) = self.process_batch(&claimed).await {
                        warn!("process claimed batch error: {err}");
                        backoff(&shutdown).await;
                    }
                }
                continue;
            }

            if let Err(err) = self.process_batch(&entries).await {
                warn!("process batch error: {err}");
                backoff(&shutdown).await;
            }
        }
    }

    /// Block-reads entries never delivered to any consumer (`>` cursor).
    /// A `NOGROUP` reply recreates the group and returns an empty batch.
    async fn read_batch(&mut self) -> Result<Vec<VoteEntry>, WorkerError> {
        let opts = StreamReadOptions::default()
            .group(&self.cfg.redis_group, &self.cfg.redis_consumer)
            .count(self.cfg.batch_size)
            .block(self.cfg.block_interval.as_millis() as usize);

        let reply: redis::RedisResult<Option<StreamReadReply>> = self
            .redis
            .xread_options(&[self.cfg.redis_stream.as_str()], &[">"], &opts)
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(err) if err.code() == Some("NOGROUP") => {
                ensure_group(&mut self.redis, &self.cfg.redis_stream, &self.cfg.redis_group)
                    .await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };

        let mut entries = Vec::new();
        for key in &reply.keys {
            for msg in &key.ids {
                if let Some(entry) = self.parse_or_discard(msg).await {
                    entries.push(entry);
                }
            }
        }

        Ok(entries)
    }

    /// Parses one raw stream entry; malformed entries are acknowledged on
    /// the spot so they never block the pending list.
    async fn parse_or_discard(&mut self, msg: &StreamId) -> Option<VoteEntry> {
        match VoteEntry::parse(msg) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("skip malformed message {}: {err}", msg.id);
                if let Err(ack_err) = self.ack(&[msg.id.clone()]).await {
                    warn!("failed to ack malformed message {}: {ack_err}", msg.id);
                }
                None
            }
        }
    }

    /// Applies a batch inside one transaction: dedup-insert every vote,
    /// bump the shard counter once per candidate, commit, then acknowledge.
    /// A refresh is published only when at least one row was inserted.
    async fn process_batch(&mut self, entries: &[VoteEntry]) -> Result<(), WorkerError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pg.begin().await?;
        let mut outcome = BatchOutcome::default();

        for entry in entries {
            let result = sqlx::query(INSERT_VOTE)
                .bind(entry.user_id)
                .bind(entry.candidate_id)
                .bind(entry.voted_at)
                .execute(&mut *tx)
                .await?;

            outcome.record(entry, result.rows_affected() > 0);
        }

        for (&candidate_id, &inc) in &outcome.increments {
            sqlx::query(BUMP_TOTALS)
                .bind(candidate_id)
                .bind(self.cfg.totals_bucket_id)
                .bind(inc)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if !outcome.ack_ids.is_empty() {
            self.ack(&outcome.ack_ids).await?;
        }

        if !outcome.increments.is_empty() && !self.cfg.results_channel.is_empty() {
            let published: redis::RedisResult<i64> =
                self.redis.publish(&self.cfg.results_channel, "refresh").await;
            if let Err(err) = published {
                warn!("publish totals update error: {err}");
            }
        }

        Ok(())
    }

    /// Scans the group's pending list and claims entries idle for at least
    /// the configured timeout, rescuing work stranded by crashed consumers.
    async fn claim_idle(&mut self) -> Result<Vec<VoteEntry>, WorkerError> {
        let min_idle_ms = self.cfg.idle_timeout.as_millis() as u64;
        let mut cursor = String::from("0-0");
        let mut claimed = Vec::new();

        loop {
            let opts = StreamAutoClaimOptions::default().count(self.cfg.batch_size);

            let reply: Option<StreamAutoClaimReply> = self
                .redis
                .xautoclaim_options(
                    &self.cfg.redis_stream,
                    &self.cfg.redis_group,
                    &self.cfg.redis_consumer,
                    min_idle_ms,
                    &cursor,
                    opts,
                )
                .await?;

            let Some(reply) = reply else {
                break;
            };

            cursor = reply.next_stream_id.clone();

            if reply.claimed.is_empty() {
                break;
            }

            for msg in &reply.claimed {
                if let Some(entry) = self.parse_or_discard(msg).await {
                    claimed.push(entry);
                }
            }

            // 0-0 means the pending list has been fully scanned.
            if cursor == "0-0" {
                break;
            }
        }

        self.last_claim = Instant::now();
        Ok(claimed)
    }

    async fn ack(&mut self, ids: &[String]) -> Result<(), WorkerError> {
        let _: i64 = self
            .redis
            .xack(&self.cfg.redis_stream, &self.cfg.redis_group, ids)
            .await?;
        Ok(())
    }
}

/// Per-batch bookkeeping: every surviving entry is acknowledged, but only
/// entries that actually inserted a row count towards the shard increments.
#[derive(Default)]
struct BatchOutcome {
    ack_ids: Vec<String>,
    increments: BTreeMap<i64, i64>,
}

impl BatchOutcome {
    fn record(&mut self, entry: &VoteEntry, inserted: bool) {
        self.ack_ids.push(entry.id.clone());
        if inserted {
            *self.increments.entry(entry.candidate_id).or_insert(0) += 1;
        }
    }
}

async fn ensure_group(
    redis: &mut ConnectionManager,
    stream: &str,
    group: &str,
) -> Result<(), WorkerError> {
    let created: redis::RedisResult<String> =
        redis.xgroup_create_mkstream(stream, group, "0").await;

    match created {
        Ok(_) => Ok(()),
        // Another worker won the race; the group exists.
        Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn backoff(shutdown: &CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn entry(id: &str, user_id: i64, candidate_id: i64) -> VoteEntry {
        VoteEntry {
            id: id.to_string(),
            user_id,
            candidate_id,
            voted_at: Utc::now(),
        }
    }

    #[test]
    fn test_outcome_counts_inserted_rows_per_candidate() {
        let mut outcome = BatchOutcome::default();
        outcome.record(&entry("1-0", 1, 1), true);
        outcome.record(&entry("2-0", 2, 1), true);
        outcome.record(&entry("3-0", 3, 2), true);

        assert_eq!(outcome.ack_ids, vec!["1-0", "2-0", "3-0"]);
        assert_eq!(outcome.increments.get(&1), Some(&2));
        assert_eq!(outcome.increments.get(&2), Some(&1));
    }

    #[test]
    fn test_outcome_acks_duplicates_without_incrementing() {
        let mut outcome = BatchOutcome::default();
        outcome.record(&entry("1-0", 1, 1), true);
        outcome.record(&entry("2-0", 1, 1), false);
        outcome.record(&entry("3-0", 1, 1), false);

        assert_eq!(outcome.ack_ids.len(), 3);
        assert_eq!(outcome.increments.get(&1), Some(&1));
    }

    #[test]
    fn test_outcome_all_duplicates_publishes_nothing() {
        let mut outcome = BatchOutcome::default();
        outcome.record(&entry("1-0", 1, 1), false);
        outcome.record(&entry("2-0", 2, 2), false);

        assert_eq!(outcome.ack_ids.len(), 2);
        assert!(outcome.increments.is_empty());
    }
}
