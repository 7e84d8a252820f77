use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use super::{
    config::Config,
    database::{init_pg, init_redis},
};

pub struct State {
    pub config: Config,
    pub redis: ConnectionManager,
    pub pg: PgPool,
}

impl State {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let redis = init_redis(&config.redis_url()).await;
        let pg = init_pg(&config.pg_dsn).await;

        Arc::new(Self { config, redis, pg })
    }
}
