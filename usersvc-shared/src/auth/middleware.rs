/// Bearer-token authentication for Axum
///
/// [`AccessController::authorize`] turns request headers into an
/// [`AuthContext`]:
///
/// 1. `Authorization` must be present and split into exactly two
///    space-separated parts (`Bearer <token>`)
/// 2. The token must decode (signature, issuer, expiry)
/// 3. The user named by `sub` must still exist
/// 4. The token must not be on the deny-list
///
/// Steps 3 and 4 run under the backend timeout.
///
/// [`require_auth`] wraps it as a `from_fn_with_state` middleware that
/// inserts the context into request extensions.
///
/// # Example
///
/// ```no_run
/// use axum::{middleware, routing::get, Extension, Router};
/// use usersvc_shared::auth::middleware::{require_auth, AccessController, AuthContext};
///
/// async fn whoami(Extension(auth): Extension<AuthContext>) -> String {
///     format!("User: {}", auth.user_id)
/// }
///
/// fn router(controller: AccessController) -> Router {
///     Router::new()
///         .route("/whoami", get(whoami))
///         .layer(middleware::from_fn_with_state(controller, require_auth))
/// }
/// ```

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::authorization::Identity;
use super::jwt::{Claims, JwtError, TokenService};
use crate::models::user::UserRole;
use crate::store::CredentialStore;

/// Authentication context added to request extensions
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Role as of the user re-fetch
    pub role: UserRole,

    /// Raw bearer token, kept for logout
    pub token: String,

    /// Decoded token claims
    pub claims: Claims,
}

impl AuthContext {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// Error type for authentication
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing authorization header
    #[error("Missing authorization header")]
    MissingCredentials,

    /// Header present but not `<scheme> <token>`
    #[error("{0}")]
    InvalidFormat(String),

    /// Token did not decode, or its user is gone
    #[error("{0}")]
    InvalidToken(String),

    /// Token was revoked at logout
    #[error("Token has been revoked")]
    Revoked,

    /// Store or cache failed while checking the token
    #[error("Authentication backend error: {0}")]
    Backend(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::Backend(detail) => {
                tracing::error!(error = %detail, "Authentication backend failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            other => (StatusCode::UNAUTHORIZED, "unauthorized", other.to_string()),
        };

        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

/// Resolves bearer tokens to authenticated users
#[derive(Clone)]
pub struct AccessController {
    tokens: TokenService,
    store: Arc<dyn CredentialStore>,
    backend_timeout: Duration,
}

impl AccessController {
    /// `backend_timeout` bounds the user re-fetch and the deny-list check
    pub fn new(
        tokens: TokenService,
        store: Arc<dyn CredentialStore>,
        backend_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            store,
            backend_timeout,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn bounded<T, E, F>(&self, what: &'static str, fut: F) -> Result<T, AuthError>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.backend_timeout, fut).await {
            Ok(result) => result.map_err(|e| AuthError::Backend(e.to_string())),
            Err(_) => Err(AuthError::Backend(format!(
                "{} timed out after {:?}",
                what, self.backend_timeout
            ))),
        }
    }

    /// Authenticates a request from its headers
    ///
    /// Deactivated users still authenticate here. Their existing tokens keep
    /// working until expiry or logout; only login refuses them.
    ///
    /// The context carries the role re-read from the store, not the role
    /// baked into the token at mint time.
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let token = extract_bearer(headers)?;

        let claims = self.tokens.decode(token).map_err(|e| match e {
            JwtError::Expired => AuthError::InvalidToken("Token has expired".to_string()),
            _ => AuthError::InvalidToken("Invalid token".to_string()),
        })?;

        let user = self
            .bounded("user lookup", self.store.find_by_id(claims.sub))
            .await?
            .ok_or_else(|| AuthError::InvalidToken("Invalid token".to_string()))?;

        let revoked = self
            .bounded("deny-list check", self.tokens.is_revoked(token))
            .await?;
        if revoked {
            return Err(AuthError::Revoked);
        }

        Ok(AuthContext {
            user_id: user.id,
            role: user.role,
            token: token.to_string(),
            claims,
        })
    }
}

/// Pulls the token out of `Authorization: <scheme> <token>`
///
/// The scheme isn't checked beyond being present.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Invalid authorization header format".to_string()))?;

    let parts: Vec<&str> = value.split(' ').collect();
    match parts.as_slice() {
        [_scheme, token] => Ok(*token),
        _ => Err(AuthError::InvalidFormat(
            "Invalid authorization header format".to_string(),
        )),
    }
}

/// Middleware for `axum::middleware::from_fn_with_state`
pub async fn require_auth(
    State(controller): State<AccessController>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = controller.authorize(req.headers()).await.map_err(|e| {
        if !matches!(e, AuthError::Backend(_)) {
            tracing::debug!(reason = %e, "Rejected request");
        }
        e
    })?;

    req.extensions_mut().insert(auth);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use crate::models::profile::CreateProfile;
    use crate::models::user::CreateUser;
    use crate::store::InMemoryCredentialStore;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    async fn setup() -> (AccessController, crate::models::user::User) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let (user, _) = store
            .create_account(
                CreateUser {
                    email: "a@x.com".to_string(),
                    username: "a".to_string(),
                    password_hash: "hash".to_string(),
                    role: UserRole::User,
                },
                CreateProfile::default(),
            )
            .await
            .unwrap();

        let tokens = TokenService::new(SECRET, chrono::Duration::hours(1), Arc::new(InMemoryCache::new()));
        (
            AccessController::new(tokens, store, std::time::Duration::from_secs(5)),
            user,
        )
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(&headers("Bearer abc")).unwrap(), "abc");
        // Scheme is not inspected
        assert_eq!(extract_bearer(&headers("Token abc")).unwrap(), "abc");

        assert!(matches!(
            extract_bearer(&HeaderMap::new()),
            Err(AuthError::MissingCredentials)
        ));
        for bad in ["abc", "Bearer a b", "Bearer  abc"] {
            assert!(matches!(
                extract_bearer(&headers(bad)),
                Err(AuthError::InvalidFormat(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_authorize_valid_token() {
        let (controller, user) = setup().await;
        let token = controller.tokens().issue(&user).unwrap();

        let auth = controller
            .authorize(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap();

        assert_eq!(auth.user_id, user.id);
        assert_eq!(auth.role, UserRole::User);
        assert_eq!(auth.token, token);
        assert_eq!(auth.identity().user_id, user.id);
    }

    #[tokio::test]
    async fn test_authorize_uses_stored_role_over_token_role() {
        let (controller, user) = setup().await;

        // Token minted while the account claimed a different role
        let mut promoted = user.clone();
        promoted.role = UserRole::Admin;
        let token = controller.tokens().issue(&promoted).unwrap();

        let auth = controller
            .authorize(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap();

        assert_eq!(auth.claims.role, UserRole::Admin);
        assert_eq!(auth.role, UserRole::User);
        assert_eq!(auth.identity().role, UserRole::User);
        assert!(!crate::auth::authorization::can_access(
            &auth.identity(),
            Uuid::new_v4()
        ));
    }

    #[tokio::test]
    async fn test_authorize_rejects_revoked_token() {
        let (controller, user) = setup().await;
        let token = controller.tokens().issue(&user).unwrap();
        let claims = controller.tokens().decode(&token).unwrap();

        controller.tokens().revoke(&token, &claims).await.unwrap();

        let err = controller
            .authorize(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Revoked));
    }

    #[tokio::test]
    async fn test_authorize_rejects_unknown_user() {
        let (controller, mut user) = setup().await;
        user.id = Uuid::new_v4();
        let token = controller.tokens().issue(&user).unwrap();

        let err = controller
            .authorize(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn test_authorize_rejects_expired_token() {
        let (controller, user) = setup().await;
        let claims = Claims::for_user(&user, chrono::Duration::seconds(-1));
        let token = controller.tokens().encode(&claims).unwrap();

        let err = controller
            .authorize(&headers(&format!("Bearer {}", token)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AuthError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::InvalidFormat("x".to_string()).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::Revoked.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Backend("down".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
