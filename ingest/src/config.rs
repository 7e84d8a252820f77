use std::env;

use settings::{normalize_addr, pg_dsn_from_env, redis_url, try_load};

pub struct Config {
    pub http_addr: String,
    pub redis_addr: String,
    pub redis_username: String,
    pub redis_password: String,
    pub redis_stream: String,
    pub pg_dsn: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            http_addr: try_load("HTTP_ADDR", ":8080"),
            redis_addr: try_load("REDIS_ADDR", "localhost:6379"),
            redis_username: env::var("REDIS_USERNAME").unwrap_or_default(),
            redis_password: env::var("REDIS_PASSWORD").unwrap_or_default(),
            redis_stream: try_load("REDIS_STREAM", "stream:votes"),
            pg_dsn: pg_dsn_from_env(),
        }
    }

    pub fn listen_addr(&self) -> String {
        normalize_addr(&self.http_addr)
    }

    pub fn redis_url(&self) -> String {
        redis_url(&self.redis_addr, &self.redis_username, &self.redis_password)
    }
}
