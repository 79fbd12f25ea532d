/// Redis client wrapper with connection pooling and health checks
///
/// Wraps `redis::aio::ConnectionManager`, which reconnects on its own after
/// a dropped connection, and implements [`SessionCache`] on top of it. Every
/// command is bounded by `command_timeout_secs`.
///
/// # Example
///
/// ```no_run
/// use usersvc_shared::redis::client::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig {
///     url: "redis://localhost:6379/0".to_string(),
///     ..Default::default()
/// })
/// .await?;
///
/// let healthy = client.health().await?;
/// println!("Redis healthy: {}", healthy);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, RedisError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::{CacheError, SessionCache};

/// Default connection URL when `REDIS_URL` is unset
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Redis client errors
#[derive(Error, Debug)]
pub enum RedisClientError {
    /// Connection error
    #[error("Redis connection error: {0}")]
    ConnectionError(String),

    /// Command execution error
    #[error("Redis command error: {0}")]
    CommandError(String),

    /// Configuration error
    #[error("Redis configuration error: {0}")]
    ConfigError(String),

    /// Health check failed
    #[error("Redis health check failed: {0}")]
    HealthCheckFailed(String),

    /// Command did not finish within the configured timeout
    #[error("Redis command timed out after {0}s")]
    Timeout(u64),
}

impl From<RedisError> for RedisClientError {
    fn from(err: RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::IoError => {
                RedisClientError::ConnectionError(format!("IO error: {}", err))
            }
            redis::ErrorKind::ResponseError => {
                RedisClientError::CommandError(format!("Response error: {}", err))
            }
            _ => RedisClientError::CommandError(err.to_string()),
        }
    }
}

impl From<RedisClientError> for CacheError {
    fn from(err: RedisClientError) -> Self {
        match err {
            RedisClientError::ConnectionError(msg) | RedisClientError::HealthCheckFailed(msg) => {
                CacheError::Connection(msg)
            }
            RedisClientError::Timeout(_) => CacheError::Connection(err.to_string()),
            RedisClientError::CommandError(msg) | RedisClientError::ConfigError(msg) => {
                CacheError::Command(msg)
            }
        }
    }
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    ///
    /// Format: redis://[username:password@]host:port[/db]
    pub url: String,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Command timeout in seconds
    pub command_timeout_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            connection_timeout_secs: 5,
            command_timeout_secs: 10,
        }
    }
}

/// Redis client with connection management
///
/// Cheap to clone; clones share the same connection manager.
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
    config: Arc<RedisConfig>,
}

impl RedisClient {
    /// Connects to Redis
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the first connection
    /// can't be established within `connection_timeout_secs`.
    pub async fn new(config: RedisConfig) -> Result<Self, RedisClientError> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            RedisClientError::ConfigError(format!("Invalid Redis URL: {}", e))
        })?;

        let manager = tokio::time::timeout(
            Duration::from_secs(config.connection_timeout_secs),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| RedisClientError::Timeout(config.connection_timeout_secs))?
        .map_err(|e| {
            RedisClientError::ConnectionError(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!(
            "Redis client connected successfully to {}",
            sanitize_url(&config.url)
        );

        Ok(Self {
            manager,
            config: Arc::new(config),
        })
    }

    /// Sends PING; true on PONG
    pub async fn health(&self) -> Result<bool, RedisClientError> {
        let mut conn = self.manager.clone();
        let result: Result<String, RedisClientError> =
            self.bounded(redis::cmd("PING").query_async(&mut conn)).await;

        match result {
            Ok(pong) if pong == "PONG" => {
                tracing::debug!("Redis health check: PONG received");
                Ok(true)
            }
            Ok(other) => {
                tracing::warn!("Redis health check: unexpected response: {}", other);
                Ok(false)
            }
            Err(e) => {
                tracing::error!("Redis health check failed: {}", e);
                Err(RedisClientError::HealthCheckFailed(e.to_string()))
            }
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, RedisClientError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        let secs = self.config.command_timeout_secs;
        tokio::time::timeout(Duration::from_secs(secs), fut)
            .await
            .map_err(|_| RedisClientError::Timeout(secs))?
            .map_err(RedisClientError::from)
    }
}

#[async_trait]
impl SessionCache for RedisClient {
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = self
            .bounded(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl_seconds.max(1))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = self
            .bounded(redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        Ok(value)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        let count: u64 = self
            .bounded(redis::cmd("EXISTS").arg(key).query_async(&mut conn))
            .await?;
        Ok(count > 0)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: u64 = self
            .bounded(redis::cmd("DEL").arg(key).query_async(&mut conn))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        match self.health().await? {
            true => Ok(()),
            false => Err(CacheError::Connection("unexpected PING response".to_string())),
        }
    }
}

/// Replaces `user:password` with `***:***` for logging
pub fn sanitize_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(scheme_end) = url.find("://") {
            let scheme = &url[..scheme_end + 3];
            let host = &url[at_pos + 1..];
            return format!("{}***:***@{}", scheme, host);
        }
    }
    url.to_string()
}
