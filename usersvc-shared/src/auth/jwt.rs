/// JWT token service
///
/// Issues, decodes and revokes the bearer tokens handed out at login.
///
/// # Security
///
/// - **Algorithm**: HS256 (HMAC with SHA-256)
/// - **Expiration**: Configurable, 24 hours by default, zero leeway
/// - **Validation**: Signature, expiration, not-before and issuer checks
/// - **Revocation**: `blacklist:{token}` entry in the session cache whose TTL
///   is the token's remaining lifetime, so the deny-list empties itself
///
/// Claims carry the user's role as it was at mint time. A later role change
/// only takes effect once the old token expires or is revoked.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use usersvc_shared::auth::jwt::TokenService;
/// use usersvc_shared::cache::InMemoryCache;
/// # use usersvc_shared::models::user::User;
///
/// # async fn example(user: &User) -> Result<(), Box<dyn std::error::Error>> {
/// let tokens = TokenService::new(
///     "your-secret-key-at-least-32-bytes-long",
///     chrono::Duration::hours(24),
///     Arc::new(InMemoryCache::new()),
/// );
///
/// let token = tokens.issue(user)?;
/// let claims = tokens.decode(&token)?;
/// assert_eq!(claims.sub, user.id);
///
/// tokens.revoke(&token, &claims).await?;
/// assert!(tokens.is_revoked(&token).await?);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{blacklist_key, CacheError, SessionCache};
use crate::models::user::{User, UserRole};

/// Issuer claim on every token
pub const TOKEN_ISSUER: &str = "usersvc";

/// Default token lifetime: 24 hours
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Signature, format or claim check failed
    #[error("Invalid token: {0}")]
    Invalid(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Issuer is not us
    #[error("Invalid token issuer")]
    InvalidIssuer,
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    pub email: String,

    pub username: String,

    /// Role at mint time
    pub role: UserRole,

    /// Issuer - Always "usersvc"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Builds claims for a user, valid from now for `ttl`
    pub fn for_user(user: &User, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            role: user.role,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Seconds left before expiry; zero or negative once expired
    pub fn remaining_seconds(&self) -> i64 {
        self.exp - Utc::now().timestamp()
    }

    /// Checks if token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Mints and checks bearer tokens
///
/// Holds the process-wide signing secret; cloning is cheap.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    cache: Arc<dyn SessionCache>,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration, cache: Arc<dyn SessionCache>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            cache,
        }
    }

    /// Mints a token from the user's current id, email, username and role
    pub fn issue(&self, user: &User) -> Result<String, JwtError> {
        self.encode(&Claims::for_user(user, self.ttl))
    }

    /// Signs arbitrary claims
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Verifies a token and extracts its claims
    ///
    /// Pure: no cache or store access. A token is expired as soon as the
    /// current second passes `exp`.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
                _ => JwtError::Invalid(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Deny-lists a token for the rest of its lifetime
    ///
    /// Does nothing if the token has already run out.
    pub async fn revoke(&self, token: &str, claims: &Claims) -> Result<(), CacheError> {
        let remaining = claims.remaining_seconds();
        if remaining <= 0 {
            tracing::debug!(user_id = %claims.sub, "Token already expired, not deny-listing");
            return Ok(());
        }

        self.cache
            .set_ex(&blacklist_key(token), "true", remaining as u64)
            .await?;

        tracing::debug!(user_id = %claims.sub, ttl = remaining, "Token deny-listed");
        Ok(())
    }

    /// Whether the token was revoked before its natural expiry
    pub async fn is_revoked(&self, token: &str) -> Result<bool, CacheError> {
        self.cache.exists(&blacklist_key(token)).await
    }
}
