/// PostgreSQL credential store
///
/// Every mutating call runs in its own transaction. An early return drops
/// the transaction, which rolls back whatever was written so far.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, StoreError, UniqueField};
use crate::db::pool::health_check;
use crate::models::profile::{CreateProfile, UserProfile};
use crate::models::user::{CreateUser, UpdateUser, User};

/// sqlx-backed [`CredentialStore`]
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool, for migrations and shutdown
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find_by_username(&self.pool, username).await?)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(UserProfile::find_by_user(&self.pool, user_id).await?)
    }

    async fn create_account(
        &self,
        user: CreateUser,
        profile: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError> {
        let mut tx = self.pool.begin().await?;

        // The constraints catch races; these checks give the common case a
        // precise field without relying on constraint names.
        if User::email_taken(&mut *tx, &user.email, None).await? {
            return Err(StoreError::Conflict(UniqueField::Email));
        }
        if User::username_taken(&mut *tx, &user.username, None).await? {
            return Err(StoreError::Conflict(UniqueField::Username));
        }

        let created = User::create(&mut *tx, user).await?;
        let profile = UserProfile::create(&mut *tx, created.id, profile).await?;

        tx.commit().await?;

        tracing::debug!(user_id = %created.id, "Created user and profile");
        Ok((created, profile))
    }

    async fn update_user(&self, id: Uuid, data: UpdateUser) -> Result<Option<User>, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(ref email) = data.email {
            if User::email_taken(&mut *tx, email, Some(id)).await? {
                return Err(StoreError::Conflict(UniqueField::Email));
            }
        }
        if let Some(ref username) = data.username {
            if User::username_taken(&mut *tx, username, Some(id)).await? {
                return Err(StoreError::Conflict(UniqueField::Username));
            }
        }

        let updated = User::update(&mut *tx, id, data).await?;
        tx.commit().await?;

        Ok(updated)
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        User::update_last_login(&self.pool, id, at).await?;
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(User::deactivate(&self.pool, id).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        health_check(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
