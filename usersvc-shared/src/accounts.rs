/// Account lifecycle
///
/// [`AccountService`] owns registration, login, logout, profile reads,
/// updates and deactivation. Each operation:
///
/// - runs inside a span tagged with the caller's correlation id
/// - validates input and checks access before touching the store
/// - bounds every store and cache call by the backend timeout
///
/// # Error mapping
///
/// | Failure | Error |
/// |---|---|
/// | Missing or blank required field | `Validation` |
/// | Unknown email, wrong password, deactivated account | `Unauthenticated` |
/// | Caller is neither the target nor an admin | `Forbidden` |
/// | Target user missing | `NotFound` |
/// | Email or username belongs to someone else | `Conflict` |
/// | Store, cache, hashing or timeout failure | `Internal` |
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use usersvc_shared::accounts::{AccountService, RegisterInput};
/// use usersvc_shared::auth::jwt::TokenService;
/// use usersvc_shared::cache::{InMemoryCache, SessionManager};
/// use usersvc_shared::store::InMemoryCredentialStore;
/// use usersvc_shared::telemetry::{LogSink, SpanEmitter};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let cache = Arc::new(InMemoryCache::new());
/// let accounts = AccountService::new(
///     Arc::new(InMemoryCredentialStore::new()),
///     TokenService::new("a-secret-that-is-at-least-32-bytes!", chrono::Duration::hours(24), cache.clone()),
///     SessionManager::new(cache, 86_400),
///     SpanEmitter::new(Arc::new(LogSink)),
///     Duration::from_secs(10),
/// );
///
/// let registered = accounts
///     .register("trace-1", RegisterInput::new("a@x.com", "alice", "pw"))
///     .await?;
/// let login = accounts.login("trace-2", "a@x.com", "pw").await?;
/// assert_eq!(login.user.id, registered.user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::auth::authorization::{require_access, AuthzError};
use crate::auth::jwt::{JwtError, TokenService};
use crate::auth::middleware::AuthContext;
use crate::auth::password::{hash_password_async, verify_password_async, PasswordError};
use crate::cache::{CacheError, Session, SessionManager};
use crate::models::profile::{CreateProfile, UserProfile};
use crate::models::user::{CreateUser, PublicUser, UpdateUser, User, UserRole};
use crate::store::{CredentialStore, StoreError, UniqueField};
use crate::telemetry::SpanEmitter;

/// Error type for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    /// Credentials rejected at login
    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Detail for the logs; clients get a generic message
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::Email) => {
                AccountError::Conflict("Email already in use".to_string())
            }
            StoreError::Conflict(UniqueField::Username) => {
                AccountError::Conflict("Username already taken".to_string())
            }
            other => AccountError::Internal(other.to_string()),
        }
    }
}

impl From<CacheError> for AccountError {
    fn from(err: CacheError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AccountError {
    fn from(err: PasswordError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<JwtError> for AccountError {
    fn from(err: JwtError) -> Self {
        AccountError::Internal(err.to_string())
    }
}

impl From<AuthzError> for AccountError {
    fn from(_: AuthzError) -> Self {
        AccountError::Forbidden("Insufficient privileges".to_string())
    }
}

/// Registration request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl RegisterInput {
    pub fn new(email: &str, username: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registered {
    pub user_id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub token: String,
    pub user: PublicUser,
}

/// Partial update; `None` leaves a field alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Profile block of a user read
///
/// `avatar_url` is only present on self reads, where it may be null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<Option<String>>,
}

/// User read
///
/// `last_login` follows the same present-only-on-self rule as `avatar_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login: Option<Option<DateTime<Utc>>>,
    pub profile: ProfileView,
}

impl UserView {
    fn build(user: User, profile: Option<UserProfile>, include_private: bool) -> Self {
        let profile = profile.unwrap_or_default();

        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            last_login: include_private.then_some(user.last_login_at),
            profile: ProfileView {
                first_name: profile.first_name,
                last_name: profile.last_name,
                phone: profile.phone,
                avatar_url: include_private.then_some(profile.avatar_url),
            },
        }
    }
}

fn required(value: &str) -> bool {
    !value.trim().is_empty()
}

fn not_found() -> AccountError {
    AccountError::NotFound("User not found".to_string())
}

/// Registration, login and account management
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenService,
    sessions: SessionManager,
    spans: SpanEmitter,
    backend_timeout: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenService,
        sessions: SessionManager,
        spans: SpanEmitter,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            store,
            tokens,
            sessions,
            spans,
            backend_timeout,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Awaits a backend call, giving up after the backend timeout
    async fn bounded<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, AccountError>
    where
        E: Into<AccountError> + Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.backend_timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(AccountError::Internal(format!(
                "{} timed out after {:?}",
                what, self.backend_timeout
            ))),
        }
    }

    /// Creates a user and its profile
    pub async fn register(
        &self,
        correlation_id: &str,
        input: RegisterInput,
    ) -> Result<Registered, AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("user_register", correlation_id, async move {
                if !required(&input.email) || !required(&input.username) || !required(&input.password)
                {
                    return Err(AccountError::Validation(
                        "Email, username, and password are required".to_string(),
                    ));
                }

                if self
                    .bounded("user lookup", self.store.find_by_email(&input.email))
                    .await?
                    .is_some()
                {
                    return Err(AccountError::Conflict("Email already registered".to_string()));
                }
                if self
                    .bounded("user lookup", self.store.find_by_username(&input.username))
                    .await?
                    .is_some()
                {
                    return Err(AccountError::Conflict("Username already taken".to_string()));
                }

                let password_hash = hash_password_async(input.password).await?;

                // The store re-checks both columns atomically with the insert
                let (user, _profile) = self
                    .bounded(
                        "account create",
                        self.store.create_account(
                            CreateUser {
                                email: input.email,
                                username: input.username,
                                password_hash,
                                role: input.role.unwrap_or_default(),
                            },
                            CreateProfile {
                                first_name: input.first_name,
                                last_name: input.last_name,
                                phone: input.phone,
                            },
                        ),
                    )
                    .await?;

                tracing::info!(user_id = %user.id, email = %user.email, "New user registered");

                Ok(Registered {
                    user_id: user.id,
                    username: user.username,
                })
            })
            .await
    }

    /// Verifies credentials, mints a token and caches the session
    pub async fn login(
        &self,
        correlation_id: &str,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("user_login", correlation_id, async move {
                if !required(email) || !required(password) {
                    return Err(AccountError::Validation(
                        "Email and password are required".to_string(),
                    ));
                }

                let invalid = || AccountError::Unauthenticated("Invalid credentials".to_string());

                let Some(user) = self.bounded("user lookup", self.store.find_by_email(email)).await?
                else {
                    tracing::warn!(email = %email, "Failed login attempt for unknown email");
                    return Err(invalid());
                };

                let verified =
                    verify_password_async(password.to_string(), user.password_hash.clone()).await?;
                if !verified {
                    tracing::warn!(email = %email, "Failed login attempt");
                    return Err(invalid());
                }

                if !user.is_active {
                    tracing::warn!(user_id = %user.id, "Login attempt on deactivated account");
                    return Err(AccountError::Unauthenticated(
                        "Account is deactivated".to_string(),
                    ));
                }

                let token = self.tokens.issue(&user)?;

                let session = Session::new(user.id, user.email.clone(), user.role);
                self.bounded(
                    "last-login update",
                    self.store.record_login(user.id, session.last_login),
                )
                .await?;

                // A timed-out write may still land; don't leave it behind
                if let Err(e) = self
                    .bounded("session write", self.sessions.store(&session))
                    .await
                {
                    if let Err(cleanup) = self
                        .bounded("session cleanup", self.sessions.remove(user.id))
                        .await
                    {
                        tracing::warn!(
                            user_id = %user.id,
                            error = %cleanup,
                            "Failed to clear session after failed login"
                        );
                    }
                    return Err(e);
                }

                tracing::info!(user_id = %user.id, "User logged in");

                Ok(LoginOutcome {
                    token,
                    user: PublicUser::from(&user),
                })
            })
            .await
    }

    /// Revokes the caller's token and drops their session
    ///
    /// Safe to repeat; the second call finds nothing left to remove.
    pub async fn logout(&self, correlation_id: &str, auth: &AuthContext) -> Result<(), AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("user_logout", correlation_id, async move {
                self.bounded("token revoke", self.tokens.revoke(&auth.token, &auth.claims))
                    .await?;
                self.bounded("session delete", self.sessions.remove(auth.user_id))
                    .await?;

                tracing::info!(user_id = %auth.user_id, "User logged out");
                Ok(())
            })
            .await
    }

    /// Reads the caller's own account, including last login and avatar
    pub async fn get_self(
        &self,
        correlation_id: &str,
        auth: &AuthContext,
    ) -> Result<UserView, AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("get_current_user", correlation_id, async move {
                let (user, profile) = self.load(auth.user_id).await?;
                Ok(UserView::build(user, profile, true))
            })
            .await
    }

    /// Reads another account; self or admin only
    pub async fn get_user(
        &self,
        correlation_id: &str,
        auth: &AuthContext,
        target: Uuid,
    ) -> Result<UserView, AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("get_user", correlation_id, async move {
                require_access(&auth.identity(), target)?;

                let (user, profile) = self.load(target).await?;
                Ok(UserView::build(user, profile, false))
            })
            .await
    }

    /// Changes email, username and/or password; self or admin only
    pub async fn update_user(
        &self,
        correlation_id: &str,
        auth: &AuthContext,
        target: Uuid,
        input: UpdateUserInput,
    ) -> Result<(), AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("update_user", correlation_id, async move {
                require_access(&auth.identity(), target)?;

                let fields = [
                    ("email", &input.email),
                    ("username", &input.username),
                    ("password", &input.password),
                ];
                for (name, value) in fields {
                    if matches!(value, Some(v) if !required(v)) {
                        return Err(AccountError::Validation(format!("{} must not be empty", name)));
                    }
                }

                if self
                    .bounded("user lookup", self.store.find_by_id(target))
                    .await?
                    .is_none()
                {
                    return Err(not_found());
                }

                let password_hash = match input.password {
                    Some(password) => Some(hash_password_async(password).await?),
                    None => None,
                };

                let update = UpdateUser {
                    email: input.email,
                    username: input.username,
                    password_hash,
                };
                let updated = self
                    .bounded("user update", self.store.update_user(target, update))
                    .await?
                    .ok_or_else(not_found)?;

                tracing::info!(
                    user_id = %updated.id,
                    actor = %auth.user_id,
                    "User updated"
                );
                Ok(())
            })
            .await
    }

    /// Soft-deletes an account; self or admin only
    ///
    /// The email and username stay reserved. There is no way back.
    pub async fn deactivate_user(
        &self,
        correlation_id: &str,
        auth: &AuthContext,
        target: Uuid,
    ) -> Result<(), AccountError> {
        self.spans
            .instrument::<_, AccountError, _>("delete_user", correlation_id, async move {
                require_access(&auth.identity(), target)?;

                if !self
                    .bounded("user deactivate", self.store.deactivate(target))
                    .await?
                {
                    return Err(not_found());
                }
                self.bounded("session delete", self.sessions.remove(target))
                    .await?;

                tracing::info!(user_id = %target, actor = %auth.user_id, "User deactivated");
                Ok(())
            })
            .await
    }

    async fn load(&self, id: Uuid) -> Result<(User, Option<UserProfile>), AccountError> {
        let user = self
            .bounded("user lookup", self.store.find_by_id(id))
            .await?
            .ok_or_else(not_found)?;
        let profile = self
            .bounded("profile lookup", self.store.find_profile(id))
            .await?;
        Ok((user, profile))
    }
}
