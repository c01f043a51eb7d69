//! Single-node Redis and Sentinel client built on the fred crate.
//!
//! The operator talks to one process at a time: every observer read or
//! healer write opens a connection, issues its commands and closes it again.

use std::collections::HashMap;
use std::time::Duration;

use fred::prelude::*;
use fred::types::{ClusterHash, CustomCommand, InfoKind, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::client::parsing::{
    ParseError, ReplicationInfo, SentinelMasterInfo, parse_sentinel_masters,
};

/// Errors that can occur during Redis or Sentinel operations.
#[derive(Error, Debug)]
pub enum RedisError {
    #[error("Redis error: {0}")]
    Redis(#[from] fred::error::Error),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Timeouts applied to every connection.
#[derive(Clone, Copy, Debug)]
pub struct RedisClientConfig {
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Command timeout.
    pub command_timeout: Duration,
}

impl Default for RedisClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(10),
        }
    }
}

/// A connection to a single Redis or Sentinel process.
pub struct RedisClient {
    client: Client,
    address: String,
}

impl RedisClient {
    /// Connect to a single node.
    ///
    /// `password` is sent with AUTH when present. Sentinels in this operator
    /// run without a password, so callers pass `None` for them.
    #[instrument(skip_all, fields(host = %host, port = %port))]
    pub async fn connect(
        host: &str,
        port: u16,
        password: Option<&str>,
        config: RedisClientConfig,
    ) -> Result<Self, RedisError> {
        let redis_config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(host, port),
            },
            password: password.map(str::to_string),
            ..Default::default()
        };

        let command_timeout = config.command_timeout;
        let connection_timeout = config.connection_timeout;

        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .build()?;

        let address = format!("{host}:{port}");
        debug!(address = %address, "Connecting");
        match tokio::time::timeout(connection_timeout, client.init()).await {
            Ok(result) => {
                result?;
            }
            Err(_) => {
                return Err(RedisError::Timeout {
                    operation: format!("connect {address}"),
                    duration: connection_timeout,
                });
            }
        }

        Ok(Self { client, address })
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), RedisError> {
        self.client.quit().await?;
        Ok(())
    }

    /// Close the connection and hand back `result`.
    ///
    /// Close failures are only logged; the outcome of the work done on the
    /// connection is what matters to callers.
    pub async fn finish<T>(self, result: Result<T, RedisError>) -> Result<T, RedisError> {
        if let Err(e) = self.close().await {
            debug!(node = %self.address, error = %e, "Failed to close connection");
        }
        result
    }

    /// Run `INFO replication`.
    #[instrument(skip(self), fields(node = %self.address))]
    pub async fn info_replication(&self) -> Result<ReplicationInfo, RedisError> {
        let raw: String = self.client.info(Some(InfoKind::Replication)).await?;
        Ok(ReplicationInfo::parse(&raw)?)
    }

    /// Run `REPLICAOF NO ONE`.
    #[instrument(skip(self), fields(node = %self.address))]
    pub async fn replicaof_no_one(&self) -> Result<(), RedisError> {
        self.custom("REPLICAOF", vec!["NO".to_string(), "ONE".to_string()])
            .await?;
        Ok(())
    }

    /// Run `REPLICAOF host port`.
    #[instrument(skip(self), fields(node = %self.address))]
    pub async fn replicaof(&self, host: &str, port: u16) -> Result<(), RedisError> {
        self.custom("REPLICAOF", vec![host.to_string(), port.to_string()])
            .await?;
        Ok(())
    }

    /// Run `CONFIG GET parameter`, returning the value if the parameter exists.
    #[instrument(skip(self), fields(node = %self.address))]
    pub async fn config_get(&self, parameter: &str) -> Result<Option<String>, RedisError> {
        let values: HashMap<String, String> =
            self.client.config_get(parameter.to_string()).await?;
        Ok(values.get(parameter).cloned())
    }

    /// Run `CONFIG SET parameter value`.
    #[instrument(skip(self, value), fields(node = %self.address))]
    pub async fn config_set(&self, parameter: &str, value: &str) -> Result<(), RedisError> {
        self.client
            .config_set(parameter.to_string(), value.to_string())
            .await?;
        Ok(())
    }

    /// Run `INFO sentinel` and parse every monitored master.
    #[instrument(skip(self), fields(sentinel = %self.address))]
    pub async fn sentinel_masters(&self) -> Result<Vec<SentinelMasterInfo>, RedisError> {
        let raw = self.custom("INFO", vec!["sentinel".to_string()]).await?;
        let text = raw
            .as_string()
            .ok_or_else(|| RedisError::InvalidResponse("INFO sentinel reply is not text".into()))?;
        Ok(parse_sentinel_masters(&text)?)
    }

    /// Run `SENTINEL REMOVE name`.
    #[instrument(skip(self), fields(sentinel = %self.address))]
    pub async fn sentinel_remove(&self, name: &str) -> Result<(), RedisError> {
        self.sentinel(vec!["REMOVE".to_string(), name.to_string()])
            .await
    }

    /// Run `SENTINEL MONITOR name ip port quorum`.
    #[instrument(skip(self), fields(sentinel = %self.address))]
    pub async fn sentinel_monitor(
        &self,
        name: &str,
        ip: &str,
        port: u16,
        quorum: i32,
    ) -> Result<(), RedisError> {
        self.sentinel(vec![
            "MONITOR".to_string(),
            name.to_string(),
            ip.to_string(),
            port.to_string(),
            quorum.to_string(),
        ])
        .await
    }

    /// Run `SENTINEL SET name option value`.
    #[instrument(skip(self, value), fields(sentinel = %self.address))]
    pub async fn sentinel_set(&self, name: &str, option: &str, value: &str) -> Result<(), RedisError> {
        self.sentinel(vec![
            "SET".to_string(),
            name.to_string(),
            option.to_string(),
            value.to_string(),
        ])
        .await
    }

    /// Run `SENTINEL RESET pattern`.
    #[instrument(skip(self), fields(sentinel = %self.address))]
    pub async fn sentinel_reset(&self, pattern: &str) -> Result<(), RedisError> {
        self.sentinel(vec!["RESET".to_string(), pattern.to_string()])
            .await
    }

    async fn sentinel(&self, args: Vec<String>) -> Result<(), RedisError> {
        self.custom("SENTINEL", args).await?;
        Ok(())
    }

    async fn custom(&self, command: &'static str, args: Vec<String>) -> Result<Value, RedisError> {
        let cmd = CustomCommand::new_static(command, ClusterHash::FirstKey, false);
        let value: Value = self.client.custom(cmd, args).await?;
        Ok(value)
    }
}
