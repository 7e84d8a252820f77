use std::env;

use settings::{normalize_addr, pg_dsn_from_env, redis_url, try_load};

pub struct Config {
    pub grpc_addr: String,
    pub redis_addr: String,
    pub redis_username: String,
    pub redis_password: String,
    pub results_channel: String,
    pub pg_dsn: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            grpc_addr: try_load("GRPC_ADDR", ":50051"),
            redis_addr: try_load("REDIS_ADDR", "localhost:6379"),
            redis_username: env::var("REDIS_USERNAME").unwrap_or_default(),
            redis_password: env::var("REDIS_PASSWORD").unwrap_or_default(),
            results_channel: try_load("RESULTS_CHANNEL", "results:totals"),
            pg_dsn: pg_dsn_from_env(),
        }
    }

    pub fn listen_addr(&self) -> String {
        normalize_addr(&self.grpc_addr)
    }

    pub fn redis_url(&self) -> String {
        redis_url(&self.redis_addr, &self.redis_username, &self.redis_password)
    }
}
