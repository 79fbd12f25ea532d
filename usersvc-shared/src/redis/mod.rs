/// Redis-backed session cache
///
/// # Example
///
/// ```no_run
/// use usersvc_shared::cache::SessionCache;
/// use usersvc_shared::redis::{RedisClient, RedisConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = RedisClient::new(RedisConfig::default()).await?;
///
/// client.set_ex("session:42", "{}", 60).await?;
/// assert!(client.exists("session:42").await?);
/// # Ok(())
/// # }
/// ```

pub mod client;

pub use client::{RedisClient, RedisClientError, RedisConfig};
