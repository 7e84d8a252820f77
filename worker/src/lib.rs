//! Tally worker.
//!
//! Consumes vote events from the stream's consumer group in batches, persists
//! raw votes and shard counters inside one Postgres transaction, acknowledges
//! processed entries, and publishes a refresh signal for subscribers.
//! Delivery is at least once; the unique `(user_id, candidate_id)` key on the
//! votes table makes redelivery harmless.

pub mod config;
pub mod entry;
pub mod error;
pub mod processor;
