/// Credential store: durable users and profiles
///
/// The account lifecycle manager only talks to the [`CredentialStore`]
/// trait. Two implementations exist:
///
/// - [`postgres::PgCredentialStore`]: sqlx over PostgreSQL, one transaction
///   per mutating call, uniqueness enforced by table constraints
/// - [`memory::InMemoryCredentialStore`]: a mutex-guarded map, used by the
///   `memory` backend and by tests
///
/// Both report a taken email/username as [`StoreError::Conflict`], whether
/// it was caught by the pre-insert check or by the store itself racing a
/// concurrent writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::models::profile::{CreateProfile, UserProfile};
use crate::models::user::{CreateUser, UpdateUser, User};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCredentialStore;
pub use postgres::PgCredentialStore;

/// Column guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Username,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::Username => f.write_str("username"),
        }
    }
}

/// Error type for credential store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Email or username already belongs to another user
    #[error("{0} already in use")]
    Conflict(UniqueField),

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                match db_err.constraint() {
                    Some(c) if c.contains("email") => return StoreError::Conflict(UniqueField::Email),
                    Some(c) if c.contains("username") => {
                        return StoreError::Conflict(UniqueField::Username)
                    }
                    _ => {}
                }
            }
        }
        StoreError::Database(err)
    }
}

/// Durable record of users and their profiles
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Looks up a user by id, active or not
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Looks up a user by exact email, active or not
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Looks up a user by exact username, active or not
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Loads the profile attached to a user
    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError>;

    /// Creates a user and its profile as one unit
    ///
    /// Either both rows exist afterwards or neither does.
    async fn create_account(
        &self,
        user: CreateUser,
        profile: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError>;

    /// Applies a partial update
    ///
    /// Returns `Conflict` if a new email/username belongs to a different
    /// user and `Ok(None)` if the user doesn't exist.
    async fn update_user(&self, id: Uuid, data: UpdateUser) -> Result<Option<User>, StoreError>;

    /// Stamps the last-login time
    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Soft-deletes a user; false if the user doesn't exist
    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Liveness check for `/health`
    async fn ping(&self) -> Result<(), StoreError>;
}
