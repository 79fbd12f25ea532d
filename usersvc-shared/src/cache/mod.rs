/// Session cache: per-key TTL storage for sessions and revoked tokens
///
/// # Key Layout
///
/// ```text
/// session:{user_id}   JSON session record, TTL = session window (24h default)
/// blacklist:{token}   "true", TTL = token's remaining lifetime
/// ```
///
/// Writes are independently atomic per key; nothing here needs a
/// cross-key transaction because a session and a deny-list entry are never
/// updated together.
///
/// Implementations:
///
/// - [`crate::redis::RedisClient`] for deployments
/// - [`memory::InMemoryCache`] for the `memory` backend and tests

use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod session;

pub use memory::InMemoryCache;
pub use session::{Session, SessionManager};

/// Error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Connection error
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Command execution error
    #[error("Cache command error: {0}")]
    Command(String),

    /// Stored value could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store with per-key expiry
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Stores `value` under `key`, expiring after `ttl_seconds`
    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    /// Reads a live value
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// True if `key` is present and not expired
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes `key`; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Liveness check for `/health`
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Cache key for a user's active session
pub fn session_key(user_id: Uuid) -> String {
    format!("session:{}", user_id)
}

/// Cache key marking a token as revoked
pub fn blacklist_key(token: &str) -> String {
    format!("blacklist:{}", token)
}
