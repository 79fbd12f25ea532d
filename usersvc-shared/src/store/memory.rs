/// In-memory credential store
///
/// All tables sit behind one mutex, so the uniqueness check and the insert
/// that follows it are atomic with respect to other callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CredentialStore, StoreError, UniqueField};
use crate::models::profile::{CreateProfile, UserProfile};
use crate::models::user::{CreateUser, UpdateUser, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, UserProfile>,
}

impl Tables {
    fn conflict(&self, email: Option<&str>, username: Option<&str>, except: Option<Uuid>) -> Option<UniqueField> {
        let others = || self.users.values().filter(move |u| Some(u.id) != except);

        if let Some(email) = email {
            if others().any(|u| u.email == email) {
                return Some(UniqueField::Email);
            }
        }
        if let Some(username) = username {
            if others().any(|u| u.username == username) {
                return Some(UniqueField::Username);
            }
        }
        None
    }
}

/// Mutex-guarded [`CredentialStore`]
#[derive(Default)]
pub struct InMemoryCredentialStore {
    tables: Mutex<Tables>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users, active or not
    pub async fn len(&self) -> usize {
        self.tables.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.tables.lock().await.profiles.get(&user_id).cloned())
    }

    async fn create_account(
        &self,
        user: CreateUser,
        profile: CreateProfile,
    ) -> Result<(User, UserProfile), StoreError> {
        let mut tables = self.tables.lock().await;

        if let Some(field) = tables.conflict(Some(&user.email), Some(&user.username), None) {
            return Err(StoreError::Conflict(field));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        let profile = profile.into_profile(created.id);

        tables.users.insert(created.id, created.clone());
        tables.profiles.insert(created.id, profile.clone());

        Ok((created, profile))
    }

    async fn update_user(&self, id: Uuid, data: UpdateUser) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.lock().await;

        if !tables.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(field) = tables.conflict(data.email.as_deref(), data.username.as_deref(), Some(id)) {
            return Err(StoreError::Conflict(field));
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(email) = data.email {
            user.email = email;
        }
        if let Some(username) = data.username {
            user.username = username;
        }
        if let Some(password_hash) = data.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> Result<bool, StoreError> {
        match self.tables.lock().await.users.get_mut(&id) {
            Some(user) => {
                user.is_active = false;
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
