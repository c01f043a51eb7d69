//! Operator configuration read from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `RECONCILE_INTERVAL_SECS` | 60 |
//! | `REQUEUE_DELAY_SECS` | 20 |
//! | `MAX_CONCURRENT_RECONCILES` | 4 |
//! | `REDIS_CONNECT_TIMEOUT_SECS` | 5 |
//! | `REDIS_COMMAND_TIMEOUT_SECS` | 10 |
//! | `SENTINEL_RESTORE_POLL_SECS` | 5 |
//! | `SENTINEL_RESTORE_TIMEOUT_SECS` | 30 |
//! | `PASS_TIMEOUT_SECS` | 300 |
//! | `HEALTH_PORT` | 8080 |

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::client::RedisClientConfig;
use crate::controller::engine::EngineConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Requeue interval after a converged pass.
    pub reconcile_interval: Duration,
    /// Requeue interval for retry signals and pending sentinels.
    pub requeue_delay: Duration,
    pub max_concurrent_reconciles: u16,
    pub redis_connect_timeout: Duration,
    pub redis_command_timeout: Duration,
    pub sentinel_restore_poll: Duration,
    pub sentinel_restore_timeout: Duration,
    /// Deadline for one whole pass, including sentinel restore waits.
    pub pass_timeout: Duration,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_secs(60),
            requeue_delay: Duration::from_secs(20),
            max_concurrent_reconciles: 4,
            redis_connect_timeout: Duration::from_secs(5),
            redis_command_timeout: Duration::from_secs(10),
            sentinel_restore_poll: Duration::from_secs(5),
            sentinel_restore_timeout: Duration::from_secs(30),
            pass_timeout: Duration::from_secs(300),
            health_port: 8080,
        }
    }
}

impl OperatorConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` to resolve variables. Missing variables keep their
    /// default; unparseable ones are logged and keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            parse_or(&lookup, key, default.as_secs()).map_or(default, Duration::from_secs)
        };

        Self {
            reconcile_interval: secs("RECONCILE_INTERVAL_SECS", defaults.reconcile_interval),
            requeue_delay: secs("REQUEUE_DELAY_SECS", defaults.requeue_delay),
            max_concurrent_reconciles: parse_or(
                &lookup,
                "MAX_CONCURRENT_RECONCILES",
                defaults.max_concurrent_reconciles,
            )
            .unwrap_or(defaults.max_concurrent_reconciles),
            redis_connect_timeout: secs("REDIS_CONNECT_TIMEOUT_SECS", defaults.redis_connect_timeout),
            redis_command_timeout: secs("REDIS_COMMAND_TIMEOUT_SECS", defaults.redis_command_timeout),
            sentinel_restore_poll: secs("SENTINEL_RESTORE_POLL_SECS", defaults.sentinel_restore_poll),
            sentinel_restore_timeout: secs(
                "SENTINEL_RESTORE_TIMEOUT_SECS",
                defaults.sentinel_restore_timeout,
            ),
            pass_timeout: secs("PASS_TIMEOUT_SECS", defaults.pass_timeout),
            health_port: parse_or(&lookup, "HEALTH_PORT", defaults.health_port)
                .unwrap_or(defaults.health_port),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            restore_poll_interval: self.sentinel_restore_poll,
            restore_timeout: self.sentinel_restore_timeout,
        }
    }

    pub fn redis_client_config(&self) -> RedisClientConfig {
        RedisClientConfig {
            connection_timeout: self.redis_connect_timeout,
            command_timeout: self.redis_command_timeout,
        }
    }
}

/// Parse `key` as a positive number; `None` when the value is zero or invalid.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default + Copy + std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Some(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => Some(value),
        _ => {
            warn!(variable = key, value = %raw, default = %default, "Invalid value, using default");
            None
        }
    }
}
