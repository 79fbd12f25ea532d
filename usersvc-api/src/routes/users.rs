/// User endpoints
///
/// All routes require a bearer token. Reads, updates and deactivation of
/// `/:id` are limited to the user themself or an admin; the access check
/// runs before the lookup, so a regular user asking for another id gets 403
/// whether or not that id exists. An id that is not a UUID cannot name a
/// user and answers 404.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::correlation::CorrelationId,
    routes::auth::MessageResponse,
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use usersvc_shared::{
    accounts::{UpdateUserInput, UserView},
    auth::middleware::AuthContext,
};
use uuid::Uuid;
use validator::Validate;

/// `{"user": {...}}` wrapper used by both reads
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserView,
}

/// Partial update; omitted fields stay unchanged
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(max = 255, message = "Email must be at most 255 characters"))]
    pub email: Option<String>,

    #[validate(length(max = 80, message = "Username must be at most 80 characters"))]
    pub username: Option<String>,

    #[validate(length(max = 1024, message = "Password must be at most 1024 characters"))]
    pub password: Option<String>,
}

fn user_id(path: Result<Path<Uuid>, PathRejection>) -> ApiResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::NotFound("Resource not found".to_string()))
}

/// Current user, with last login and avatar
///
/// ```text
/// GET /api/users/me
/// Authorization: Bearer <token>
/// ```
pub async fn get_current_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    correlation: CorrelationId,
) -> ApiResult<Json<UserResponse>> {
    let user = state.accounts.get_self(correlation.as_str(), &auth).await?;
    Ok(Json(UserResponse { user }))
}

/// User by id
///
/// # Errors
///
/// - `403 Forbidden`: Caller is neither the user nor an admin
/// - `404 Not Found`: No such user
pub async fn get_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    correlation: CorrelationId,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<UserResponse>> {
    let id = user_id(path)?;
    let user = state
        .accounts
        .get_user(correlation.as_str(), &auth, id)
        .await?;
    Ok(Json(UserResponse { user }))
}

/// Update email, username and/or password
///
/// ```text
/// PUT /api/users/:id
/// Authorization: Bearer <token>
///
/// { "username": "new-name" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Empty or oversized field, malformed JSON
/// - `403 Forbidden`: Caller is neither the user nor an admin
/// - `404 Not Found`: No such user
/// - `409 Conflict`: Email or username belongs to someone else
pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    correlation: CorrelationId,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let id = user_id(path)?;
    let Json(req) = payload?;
    req.validate()?;

    let input = UpdateUserInput {
        email: req.email,
        username: req.username,
        password: req.password,
    };
    state
        .accounts
        .update_user(correlation.as_str(), &auth, id, input)
        .await?;

    Ok(Json(MessageResponse::new("User updated successfully")))
}

/// Deactivate (soft-delete) a user
///
/// The account can no longer log in; its email and username stay taken.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    correlation: CorrelationId,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<MessageResponse>> {
    let id = user_id(path)?;
    state
        .accounts
        .deactivate_user(correlation.as_str(), &auth, id)
        .await?;

    Ok(Json(MessageResponse::new("User deleted successfully")))
}
