use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}
