use std::{env, time::Duration};

use chrono::Utc;
use gethostname::gethostname;
use settings::{pg_dsn_from_env, redis_url, try_load, try_load_duration};

pub struct Config {
    pub redis_addr: String,
    pub redis_username: String,
    pub redis_password: String,
    pub redis_stream: String,
    pub redis_group: String,
    pub redis_consumer: String,
    pub results_channel: String,

    pub batch_size: usize,
    pub block_interval: Duration,
    pub idle_timeout: Duration,

    pub pg_dsn: String,
    pub totals_bucket_id: i32,
}

impl Config {
    pub fn load() -> Self {
        Self {
            redis_addr: try_load("REDIS_ADDR", "localhost:6379"),
            redis_username: env::var("REDIS_USERNAME").unwrap_or_default(),
            redis_password: env::var("REDIS_PASSWORD").unwrap_or_default(),
            redis_stream: try_load("REDIS_STREAM", "stream:votes"),
            redis_group: try_load("REDIS_GROUP", "tally"),
            redis_consumer: env::var("REDIS_CONSUMER")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(generate_consumer_id),
            results_channel: try_load("RESULTS_CHANNEL", "results:totals"),
            batch_size: try_load("BATCH_SIZE", "100"),
            block_interval: try_load_duration("BLOCK_INTERVAL", "5s"),
            idle_timeout: try_load_duration("IDLE_TIMEOUT", "30s"),
            pg_dsn: pg_dsn_from_env(),
            totals_bucket_id: try_load("TOTALS_BUCKET_ID", "0"),
        }
    }

    pub fn redis_url(&self) -> String {
        redis_url(&self.redis_addr, &self.redis_username, &self.redis_password)
    }
}

/// Best-effort unique consumer identity, stable for the life of the process.
pub fn generate_consumer_id() -> String {
    let host = gethostname();
    let host = host.to_string_lossy();
    let host: &str = if host.is_empty() { "worker" } else { host.as_ref() };

    format!("{host}-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::generate_consumer_id;

    #[test]
    fn test_consumer_id_has_host_and_nanos() {
        let id = generate_consumer_id();
        let (host, nanos) = id.rsplit_once('-').unwrap();
        assert!(!host.is_empty());
        assert!(nanos.parse::<i64>().is_ok());
    }
}
