/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use usersvc_api::{app::{build_router, AppState}, config::Config};
/// use usersvc_shared::cache::InMemoryCache;
/// use usersvc_shared::store::InMemoryCredentialStore;
/// use usersvc_shared::telemetry::LogSink;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(
///     config,
///     Arc::new(InMemoryCredentialStore::new()),
///     Arc::new(InMemoryCache::new()),
///     Arc::new(LogSink),
/// );
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use crate::error::ApiError;
use crate::middleware::active_requests::{track_active_requests, ActiveRequests};
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use usersvc_shared::accounts::AccountService;
use usersvc_shared::auth::jwt::TokenService;
use usersvc_shared::auth::middleware::{require_auth, AccessController};
use usersvc_shared::cache::{SessionCache, SessionManager};
use usersvc_shared::store::CredentialStore;
use usersvc_shared::telemetry::{SpanEmitter, SpanSink};

/// Request bodies above this are rejected with 413
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state
///
/// Cloned for each request via Axum's `State` extractor; everything inside
/// is reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,

    pub access: AccessController,

    /// Kept for `/health` checks
    pub store: Arc<dyn CredentialStore>,

    /// Kept for `/health` checks
    pub cache: Arc<dyn SessionCache>,

    pub spans: SpanEmitter,

    pub active: ActiveRequests,

    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the account services onto the given backends
    pub fn new(
        config: Config,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn SessionCache>,
        sink: Arc<dyn SpanSink>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt.secret, config.token_ttl(), cache.clone());
        let sessions = SessionManager::new(cache.clone(), config.session_ttl_seconds);
        let spans = SpanEmitter::new(sink);

        let accounts = AccountService::new(
            store.clone(),
            tokens.clone(),
            sessions,
            spans.clone(),
            config.backend_timeout(),
        );
        let access = AccessController::new(tokens, store.clone(), config.backend_timeout());

        Self {
            accounts,
            access,
            store,
            cache,
            spans,
            active: ActiveRequests::new(),
            config: Arc::new(config),
        }
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET /health                  # public
/// ├── /api/auth/
/// │   ├── POST /register           # public
/// │   ├── POST /login              # public
/// │   └── POST /logout             # bearer token
/// └── /api/users/                  # bearer token
///     ├── GET    /me
///     ├── GET    /:id
///     ├── PUT    /:id
///     └── DELETE /:id
/// ```
///
/// Layers, innermost first: authentication (per route group), body limit,
/// CORS, request tracing, active-request gauge.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_layer = from_fn_with_state(state.access.clone(), require_auth);

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    let protected_auth_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .layer(auth_layer.clone());

    let user_routes = Router::new()
        .route("/me", get(routes::users::get_current_user))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .layer(auth_layer);

    let api_routes = Router::new()
        .nest("/auth", public_auth_routes.merge(protected_auth_routes))
        .nest("/users", user_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::HeaderName::from_static(crate::middleware::correlation::TRACE_ID_HEADER),
            ])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/api", api_routes)
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(from_fn_with_state(state.active.clone(), track_active_requests))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    ApiError::NotFound("Resource not found".to_string())
}
