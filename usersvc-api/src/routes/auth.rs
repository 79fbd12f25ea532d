/// Authentication endpoints
///
/// - `POST /api/auth/register` - Create an account
/// - `POST /api/auth/login` - Exchange credentials for a bearer token
/// - `POST /api/auth/logout` - Revoke the presented token
///
/// Request bodies are bounded with `validator` before they reach the account
/// service; required-field checks happen in the service so that every
/// caller gets the same messages.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::correlation::CorrelationId,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use usersvc_shared::{
    accounts::RegisterInput,
    auth::middleware::AuthContext,
    models::user::{PublicUser, UserRole},
};
use uuid::Uuid;
use validator::Validate;

/// Register request
///
/// Missing strings deserialize as empty and are rejected as required.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    #[validate(length(max = 255, message = "Email must be at most 255 characters"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 80, message = "Username must be at most 80 characters"))]
    pub username: String,

    #[serde(default)]
    #[validate(length(max = 1024, message = "Password must be at most 1024 characters"))]
    pub password: String,

    /// Requested role; defaults to `user`
    pub role: Option<UserRole>,

    #[validate(length(max = 100, message = "First name must be at most 100 characters"))]
    pub first_name: Option<String>,

    #[validate(length(max = 100, message = "Last name must be at most 100 characters"))]
    pub last_name: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,
}

impl From<RegisterRequest> for RegisterInput {
    fn from(req: RegisterRequest) -> Self {
        RegisterInput {
            email: req.email,
            username: req.username,
            password: req.password,
            role: req.role,
            first_name: req.first_name,
            last_name: req.last_name,
            phone: req.phone,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user_id: Uuid,
    pub username: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[serde(default)]
    #[validate(length(max = 255, message = "Email must be at most 255 characters"))]
    pub email: String,

    #[serde(default)]
    #[validate(length(max = 1024, message = "Password must be at most 1024 characters"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    /// Bearer token for the `Authorization` header
    pub token: String,

    pub user: PublicUser,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Register a new user
///
/// ```text
/// POST /api/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "user@example.com",
///   "username": "user",
///   "password": "SecureP@ss123",
///   "first_name": "Ada"
/// }
/// ```
///
/// # Response (201)
///
/// ```json
/// { "message": "User registered successfully", "user_id": "uuid", "username": "user" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing or oversized fields, malformed JSON
/// - `409 Conflict`: Email or username already taken
/// - `500 Internal Server Error`: Server error
pub async fn register(
    State(state): State<AppState>,
    correlation: CorrelationId,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let Json(req) = payload?;
    req.validate()?;

    let registered = state
        .accounts
        .register(correlation.as_str(), req.into())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user_id: registered.user_id,
            username: registered.username,
        }),
    ))
}

/// Login with email and password
///
/// ```text
/// POST /api/auth/login
/// Content-Type: application/json
///
/// { "email": "user@example.com", "password": "SecureP@ss123" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "token": "eyJ...",
///   "user": { "id": "uuid", "email": "user@example.com", "username": "user", "role": "user" }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Missing fields, malformed JSON
/// - `401 Unauthorized`: Invalid credentials or deactivated account
pub async fn login(
    State(state): State<AppState>,
    correlation: CorrelationId,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(req) = payload?;
    req.validate()?;

    let outcome = state
        .accounts
        .login(correlation.as_str(), &req.email, &req.password)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Login failed");
            ApiError::from(e)
        })?;

    Ok(Json(LoginResponse {
        token: outcome.token,
        user: outcome.user,
    }))
}

/// Logout
///
/// Revokes the bearer token used for this request and clears the cached
/// session. Other tokens of the same user stay valid.
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    correlation: CorrelationId,
) -> ApiResult<Json<MessageResponse>> {
    state.accounts.logout(correlation.as_str(), &auth).await?;

    Ok(Json(MessageResponse::new("Logged out successfully")))
}
