//! Redis and Sentinel protocol access.
//!
//! - `redis_client`: single-node fred wrapper with per-call timeouts
//! - `parsing`: `INFO replication` / `INFO sentinel` parsing

pub mod parsing;
pub mod redis_client;

pub use parsing::{ReplicationInfo, ReplicationRole, SentinelMasterInfo};
pub use redis_client::{RedisClient, RedisClientConfig, RedisError};
