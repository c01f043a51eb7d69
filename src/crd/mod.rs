//! Custom Resource Definitions for redis-sentinel-operator.
//!
//! - `RedisSentinel`: a Redis replication group supervised by Sentinels

mod redis_sentinel;

pub use redis_sentinel::*;
