/// Cached login sessions
///
/// A session is written (or overwritten) at login under `session:{user_id}`
/// and deleted at logout. Otherwise it expires passively after the session
/// window.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use usersvc_shared::cache::{InMemoryCache, Session, SessionManager};
/// use usersvc_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sessions = SessionManager::new(Arc::new(InMemoryCache::new()), 86_400);
///
/// let session = Session::new(Uuid::new_v4(), "a@x.com".to_string(), UserRole::User);
/// sessions.store(&session).await?;
/// assert!(sessions.get(session.user_id).await?.is_some());
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::{session_key, CacheError, SessionCache};
use crate::models::user::UserRole;

/// Default session window: 24 hours
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Session record stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub last_login: DateTime<Utc>,
}

impl Session {
    /// Creates a session stamped with the current time
    pub fn new(user_id: Uuid, email: String, role: UserRole) -> Self {
        Self {
            user_id,
            email,
            role,
            last_login: Utc::now(),
        }
    }

    pub fn to_json(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CacheError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Reads and writes sessions through a [`SessionCache`]
#[derive(Clone)]
pub struct SessionManager {
    cache: Arc<dyn SessionCache>,
    ttl_seconds: u64,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn SessionCache>, ttl_seconds: u64) -> Self {
        Self { cache, ttl_seconds }
    }

    /// Writes the session, replacing any previous one for the user
    pub async fn store(&self, session: &Session) -> Result<(), CacheError> {
        let key = session_key(session.user_id);
        self.cache
            .set_ex(&key, &session.to_json()?, self.ttl_seconds)
            .await?;

        tracing::debug!(
            user_id = %session.user_id,
            ttl = self.ttl_seconds,
            "Stored session"
        );
        Ok(())
    }

    /// Loads the live session for a user
    pub async fn get(&self, user_id: Uuid) -> Result<Option<Session>, CacheError> {
        match self.cache.get(&session_key(user_id)).await? {
            Some(json) => Ok(Some(Session::from_json(&json)?)),
            None => Ok(None),
        }
    }

    /// Deletes the session; a missing session is fine
    pub async fn remove(&self, user_id: Uuid) -> Result<(), CacheError> {
        self.cache.delete(&session_key(user_id)).await?;
        tracing::debug!(user_id = %user_id, "Removed session");
        Ok(())
    }
}
