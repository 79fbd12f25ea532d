/// Account lifecycle integration tests
///
/// Runs against the in-memory store and cache, so no external services are
/// needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use usersvc_shared::accounts::{AccountError, AccountService, RegisterInput, UpdateUserInput};
use usersvc_shared::auth::authorization::{can_access, Identity};
use usersvc_shared::auth::jwt::{Claims, JwtError, TokenService};
use usersvc_shared::auth::middleware::{AccessController, AuthContext, AuthError};
use usersvc_shared::cache::{InMemoryCache, SessionManager};
use usersvc_shared::models::profile::{CreateProfile, UserProfile};
use usersvc_shared::models::user::{CreateUser, UpdateUser, User, UserRole};
use usersvc_shared::store::{CredentialStore, InMemoryCredentialStore, StoreError};
use usersvc_shared::telemetry::{RecordingSink, SpanEmitter, SpanOutcome};
use uuid::Uuid;

const SECRET: &str = "integration-secret-key-at-least-32-bytes";

struct TestEnv {
    accounts: AccountService,
    access: AccessController,
    spans: Arc<RecordingSink>,
}

fn env_with_store(store: Arc<dyn CredentialStore>, backend_timeout: Duration) -> TestEnv {
    let cache = Arc::new(InMemoryCache::new());
    let tokens = TokenService::new(SECRET, chrono::Duration::hours(24), cache.clone());
    let spans = Arc::new(RecordingSink::new());

    TestEnv {
        accounts: AccountService::new(
            store.clone(),
            tokens.clone(),
            SessionManager::new(cache, 86_400),
            SpanEmitter::new(spans.clone()),
            backend_timeout,
        ),
        access: AccessController::new(tokens, store, backend_timeout),
        spans,
    }
}

fn test_env() -> TestEnv {
    env_with_store(Arc::new(InMemoryCredentialStore::new()), Duration::from_secs(5))
}

fn bearer(token: &str) -> axum::http::HeaderMap {
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(
        axum::http::header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    headers
}

impl TestEnv {
    async fn register(&self, email: &str, username: &str, role: UserRole) -> Uuid {
        self.accounts
            .register(
                "test",
                RegisterInput {
                    role: Some(role),
                    ..RegisterInput::new(email, username, "password123")
                },
            )
            .await
            .unwrap()
            .user_id
    }

    async fn login(&self, email: &str) -> AuthContext {
        let outcome = self.accounts.login("test", email, "password123").await.unwrap();
        self.access.authorize(&bearer(&outcome.token)).await.unwrap()
    }
}

#[tokio::test]
async fn test_register_then_login_claims_match() {
    let env = test_env();
    let user_id = env.register("alice@example.com", "alice", UserRole::User).await;

    let outcome = env
        .accounts
        .login("test", "alice@example.com", "password123")
        .await
        .unwrap();
    let claims = env.accounts.tokens().decode(&outcome.token).unwrap();

    assert_eq!(claims.sub, user_id);
    assert_eq!(claims.email, "alice@example.com");
    assert_eq!(claims.username, "alice");
    assert_eq!(claims.role, UserRole::User);
    assert_eq!(outcome.user.id, user_id);
}

#[tokio::test]
async fn test_duplicate_email_with_different_username_conflicts() {
    let env = test_env();
    env.register("alice@example.com", "alice", UserRole::User).await;

    let err = env
        .accounts
        .register("test", RegisterInput::new("alice@example.com", "alice2", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Conflict(_)));
}

#[tokio::test]
async fn test_concurrent_registrations_with_same_email() {
    let env = test_env();

    let (a, b) = tokio::join!(
        env.accounts
            .register("a", RegisterInput::new("race@example.com", "racer-a", "pw")),
        env.accounts
            .register("b", RegisterInput::new("race@example.com", "racer-b", "pw")),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1);
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err, AccountError::Conflict(_)));
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let env = test_env();
    let user_id = env.register("alice@example.com", "alice", UserRole::User).await;
    let auth = env.login("alice@example.com").await;
    assert_eq!(auth.user_id, user_id);

    let mut claims: Claims = auth.claims.clone();
    claims.iat -= 7200;
    claims.nbf -= 7200;
    claims.exp = Utc::now().timestamp() - 1;
    let stale = env.accounts.tokens().encode(&claims).unwrap();

    assert!(matches!(env.accounts.tokens().decode(&stale), Err(JwtError::Expired)));
    assert!(matches!(
        env.access.authorize(&bearer(&stale)).await,
        Err(AuthError::InvalidToken(_))
    ));
}

#[tokio::test]
async fn test_logout_revokes_token() {
    let env = test_env();
    let user_id = env.register("alice@example.com", "alice", UserRole::User).await;
    let auth = env.login("alice@example.com").await;
    assert!(env.accounts.sessions().get(user_id).await.unwrap().is_some());

    env.accounts.logout("test", &auth).await.unwrap();
    // Logout is idempotent
    env.accounts.logout("test", &auth).await.unwrap();

    assert!(env.accounts.sessions().get(user_id).await.unwrap().is_none());
    assert!(matches!(
        env.access.authorize(&bearer(&auth.token)).await,
        Err(AuthError::Revoked)
    ));
}

#[tokio::test]
async fn test_can_access_rules() {
    let me = Identity {
        user_id: Uuid::new_v4(),
        role: UserRole::User,
    };
    let admin = Identity {
        user_id: Uuid::new_v4(),
        role: UserRole::Admin,
    };
    let other = Uuid::new_v4();

    assert!(can_access(&me, me.user_id));
    assert!(!can_access(&me, other));
    assert!(can_access(&admin, other));
    assert!(can_access(&admin, me.user_id));
}

#[tokio::test]
async fn test_forbidden_checked_before_not_found() {
    let env = test_env();
    env.register("alice@example.com", "alice", UserRole::User).await;
    let alice = env.login("alice@example.com").await;

    let err = env
        .accounts
        .get_user("test", &alice, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Forbidden(_)));

    env.register("root@example.com", "root", UserRole::Admin).await;
    let admin = env.login("root@example.com").await;
    let err = env
        .accounts
        .get_user("test", &admin, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::NotFound(_)));
}

#[tokio::test]
async fn test_deactivation_blocks_login_but_admin_can_read() {
    let env = test_env();
    let bob_id = env.register("bob@example.com", "bob", UserRole::User).await;
    env.register("root@example.com", "root", UserRole::Admin).await;
    let bob = env.login("bob@example.com").await;
    let admin = env.login("root@example.com").await;

    env.accounts.deactivate_user("test", &bob, bob_id).await.unwrap();

    let err = env
        .accounts
        .login("test", "bob@example.com", "password123")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Unauthenticated(ref m) if m == "Account is deactivated"));

    let view = env.accounts.get_user("test", &admin, bob_id).await.unwrap();
    assert!(!view.is_active);
    assert_eq!(view.username, "bob");

    // Email and username stay reserved
    let err = env
        .accounts
        .register("test", RegisterInput::new("bob@example.com", "bob2", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Conflict(_)));
}

#[tokio::test]
async fn test_update_user() {
    let env = test_env();
    let alice_id = env.register("alice@example.com", "alice", UserRole::User).await;
    let bob_id = env.register("bob@example.com", "bob", UserRole::User).await;
    let alice = env.login("alice@example.com").await;

    // Someone else's account
    let err = env
        .accounts
        .update_user("test", &alice, bob_id, UpdateUserInput::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Forbidden(_)));

    // Taken username
    let err = env
        .accounts
        .update_user(
            "test",
            &alice,
            alice_id,
            UpdateUserInput {
                username: Some("bob".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Conflict(_)));

    env.accounts
        .update_user(
            "test",
            &alice,
            alice_id,
            UpdateUserInput {
                email: Some("alice@example.com".to_string()),
                password: Some("new-password".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Username untouched, password changed
    let view = env.accounts.get_self("test", &alice).await.unwrap();
    assert_eq!(view.username, "alice");
    assert!(env
        .accounts
        .login("test", "alice@example.com", "new-password")
        .await
        .is_ok());
    assert!(matches!(
        env.accounts.login("test", "alice@example.com", "password123").await,
        Err(AccountError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn test_spans_emitted_on_every_path() {
    let env = test_env();
    env.register("alice@example.com", "alice", UserRole::User).await;
    let _ = env.accounts.login("wrong-password", "alice@example.com", "nope").await;

    let spans = env.spans.spans();
    let ops: Vec<&str> = spans.iter().map(|s| s.operation_name.as_str()).collect();
    assert_eq!(ops, ["user_register", "user_login"]);
    assert_eq!(spans[0].outcome, SpanOutcome::Ok);
    assert_eq!(spans[1].outcome, SpanOutcome::Error);
    assert_eq!(spans[1].trace_id, "wrong-password");
}

/// Store whose every call fails
struct FailingStore;

#[async_trait]
impl CredentialStore for FailingStore {
    async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn find_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn find_by_username(&self, _: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn find_profile(&self, _: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn create_account(
        &self,
        _: CreateUser,
        _: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn update_user(&self, _: Uuid, _: UpdateUser) -> Result<Option<User>, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn record_login(&self, _: Uuid, _: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn deactivate(&self, _: Uuid) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_is_internal() {
    let env = env_with_store(Arc::new(FailingStore), Duration::from_secs(5));

    let err = env
        .accounts
        .register("test", RegisterInput::new("a@example.com", "a", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Internal(_)));

    let err = env
        .accounts
        .login("test", "a@example.com", "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Internal(_)));

    // Validation still wins before the store is touched
    let err = env
        .accounts
        .register("test", RegisterInput::new("", "a", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Validation(_)));
}

/// Store that never answers
struct HangingStore;

#[async_trait]
impl CredentialStore for HangingStore {
    async fn find_by_id(&self, _: Uuid) -> Result<Option<User>, StoreError> {
        std::future::pending().await
    }
    async fn find_by_email(&self, _: &str) -> Result<Option<User>, StoreError> {
        std::future::pending().await
    }
    async fn find_by_username(&self, _: &str) -> Result<Option<User>, StoreError> {
        std::future::pending().await
    }
    async fn find_profile(&self, _: Uuid) -> Result<Option<UserProfile>, StoreError> {
        std::future::pending().await
    }
    async fn create_account(
        &self,
        _: CreateUser,
        _: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError> {
        std::future::pending().await
    }
    async fn update_user(&self, _: Uuid, _: UpdateUser) -> Result<Option<User>, StoreError> {
        std::future::pending().await
    }
    async fn record_login(&self, _: Uuid, _: DateTime<Utc>) -> Result<(), StoreError> {
        std::future::pending().await
    }
    async fn deactivate(&self, _: Uuid) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_backend_timeout_is_internal() {
    let env = env_with_store(Arc::new(HangingStore), Duration::from_secs(2));

    let err = env
        .accounts
        .login("test", "a@example.com", "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Internal(ref m) if m.contains("timed out")));

    let spans = env.spans.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].outcome, SpanOutcome::Error);
}

#[tokio::test(start_paused = true)]
async fn test_authorize_times_out_on_hanging_store() {
    let env = env_with_store(Arc::new(HangingStore), Duration::from_secs(2));

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: "alice@example.com".to_string(),
        username: "alice".to_string(),
        password_hash: String::new(),
        role: UserRole::User,
        is_active: true,
        created_at: now,
        updated_at: now,
        last_login_at: None,
    };
    let token = env
        .accounts
        .tokens()
        .encode(&Claims::for_user(&user, chrono::Duration::hours(1)))
        .unwrap();

    let err = env.access.authorize(&bearer(&token)).await.unwrap_err();
    assert!(matches!(err, AuthError::Backend(ref m) if m.contains("timed out")));
}

/// In-memory store whose last-login write always fails
struct StampFailingStore(InMemoryCredentialStore);

#[async_trait]
impl CredentialStore for StampFailingStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.0.find_by_id(id).await
    }
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.0.find_by_email(email).await
    }
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.0.find_by_username(username).await
    }
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        self.0.find_profile(user_id).await
    }
    async fn create_account(
        &self,
        user: CreateUser,
        profile: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError> {
        self.0.create_account(user, profile).await
    }
    async fn update_user(&self, id: Uuid, data: UpdateUser) -> Result<Option<User>, StoreError> {
        self.0.update_user(id, data).await
    }
    async fn record_login(&self, _: Uuid, _: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("write rejected".to_string()))
    }
    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        self.0.deactivate(id).await
    }
    async fn ping(&self) -> Result<(), StoreError> {
        self.0.ping().await
    }
}

#[tokio::test]
async fn test_failed_login_stamp_leaves_no_session() {
    let env = env_with_store(
        Arc::new(StampFailingStore(InMemoryCredentialStore::new())),
        Duration::from_secs(5),
    );
    let user_id = env.register("alice@example.com", "alice", UserRole::User).await;

    let err = env
        .accounts
        .login("test", "alice@example.com", "password123")
        .await
        .unwrap_err();
    assert!(matches!(err, AccountError::Internal(_)));

    assert!(env.accounts.sessions().get(user_id).await.unwrap().is_none());
}
