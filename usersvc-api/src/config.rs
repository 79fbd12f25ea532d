/// Configuration management for the API server
///
/// Loaded from environment variables (and `.env` when present).
///
/// # Environment Variables
///
/// - `API_HOST`: Host to bind to (default: 0.0.0.0)
/// - `API_PORT`: Port to bind to (default: 5000)
/// - `CORS_ORIGINS`: Comma-separated allowed origins (default: `*`)
/// - `STORAGE_BACKEND`: `postgres` or `memory` (default: postgres)
/// - `DATABASE_URL`: PostgreSQL connection string (required for postgres)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `REDIS_URL`: Redis URL (default: redis://localhost:6379/0)
/// - `JWT_SECRET`: Token signing secret, at least 32 characters (required)
/// - `JWT_EXPIRATION_HOURS`: Token lifetime (default: 24)
/// - `SESSION_TTL_SECONDS`: Cached session lifetime (default: 86400)
/// - `BACKEND_TIMEOUT_SECS`: Per-call store/cache deadline (default: 10)
/// - `JAEGER_ENDPOINT`: Trace collector base URL (optional)
/// - `LOG_FORMAT`: `json` for JSON logs (read in `main`)
///
/// # Example
///
/// ```no_run
/// use usersvc_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,

    /// Where users and sessions live
    pub backend: StorageBackend,

    pub database: DatabaseConfig,

    pub redis: RedisConfig,

    pub jwt: JwtConfig,

    /// Cached session lifetime in seconds
    pub session_ttl_seconds: u64,

    /// Deadline for each store or cache call
    pub backend_timeout_secs: u64,

    /// Trace collector base URL; spans are only logged when unset
    pub jaeger_endpoint: Option<String>,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,

    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// PostgreSQL for users, Redis for sessions
    Postgres,

    /// Process-local maps; data is lost on restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("STORAGE_BACKEND must be 'postgres' or 'memory', got '{}'", other),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; empty for the memory backend
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// JWT configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    /// Token lifetime in hours
    pub expiration_hours: i64,
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `JWT_SECRET` is missing or shorter than 32 characters
    /// - `DATABASE_URL` is missing with the postgres backend
    /// - a numeric variable doesn't parse
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "API_PORT", 5000u16)?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let backend = parse_or(&lookup, "STORAGE_BACKEND", StorageBackend::Postgres)?;

        let database_url = match (lookup("DATABASE_URL"), backend) {
            (Some(url), _) => url,
            (None, StorageBackend::Memory) => String::new(),
            (None, StorageBackend::Postgres) => {
                anyhow::bail!("DATABASE_URL environment variable is required")
            }
        };
        let max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?;

        let redis_url = lookup("REDIS_URL")
            .unwrap_or_else(|| usersvc_shared::redis::client::DEFAULT_REDIS_URL.to_string());

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let expiration_hours = parse_or(&lookup, "JWT_EXPIRATION_HOURS", 24i64)?;
        if expiration_hours <= 0 {
            anyhow::bail!("JWT_EXPIRATION_HOURS must be positive");
        }

        Ok(Self {
            api: ApiConfig {
                host,
                port,
                cors_origins,
            },
            backend,
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            redis: RedisConfig { url: redis_url },
            jwt: JwtConfig {
                secret: jwt_secret,
                expiration_hours,
            },
            session_ttl_seconds: parse_or(&lookup, "SESSION_TTL_SECONDS", 86_400u64)?,
            backend_timeout_secs: parse_or(&lookup, "BACKEND_TIMEOUT_SECS", 10u64)?,
            jaeger_endpoint: lookup("JAEGER_ENDPOINT").filter(|url| !url.trim().is_empty()),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.jwt.expiration_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("DATABASE_URL", "postgresql://localhost/users"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.backend, StorageBackend::Postgres);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.redis.url, "redis://localhost:6379/0");
        assert_eq!(config.jwt.expiration_hours, 24);
        assert_eq!(config.session_ttl_seconds, 86_400);
        assert_eq!(config.backend_timeout(), Duration::from_secs(10));
        assert!(config.jaeger_endpoint.is_none());
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config = load(&[("JWT_SECRET", SECRET), ("STORAGE_BACKEND", "memory")]).unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);
        assert!(config.database.url.is_empty());
    }

    #[test]
    fn test_required_values() {
        assert!(load(&[("DATABASE_URL", "postgresql://localhost/users")]).is_err());
        assert!(load(&[("JWT_SECRET", SECRET)]).is_err());
        assert!(load(&[("JWT_SECRET", "short"), ("STORAGE_BACKEND", "memory")]).is_err());
    }

    #[test]
    fn test_invalid_numbers_and_backend() {
        let base = [("JWT_SECRET", SECRET), ("STORAGE_BACKEND", "memory")];

        let mut vars = base.to_vec();
        vars.push(("API_PORT", "not-a-port"));
        assert!(load(&vars).is_err());

        let mut vars = base.to_vec();
        vars.push(("JWT_EXPIRATION_HOURS", "0"));
        assert!(load(&vars).is_err());

        assert!(load(&[("JWT_SECRET", SECRET), ("STORAGE_BACKEND", "sqlite")]).is_err());
    }

    #[test]
    fn test_cors_origins_list() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("STORAGE_BACKEND", "memory"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
            ("JAEGER_ENDPOINT", "http://jaeger:14268"),
        ])
        .unwrap();

        assert_eq!(
            config.api.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.jaeger_endpoint.as_deref(), Some("http://jaeger:14268"));
    }
}
