/// User profile model and database operations
///
/// Profiles are 1:1 with users and are created in the same transaction as
/// their user. They are never deleted independently.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE user_profiles (
///     user_id UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
///     first_name VARCHAR(100) NOT NULL DEFAULT '',
///     last_name VARCHAR(100) NOT NULL DEFAULT '',
///     phone VARCHAR(32) NOT NULL DEFAULT '',
///     avatar_url VARCHAR(512)
/// );
/// ```

use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use uuid::Uuid;

/// Profile fields attached to a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    /// Owning user
    pub user_id: Uuid,

    pub first_name: String,

    pub last_name: String,

    pub phone: String,

    /// Optional avatar/profile picture URL
    pub avatar_url: Option<String>,
}

/// Input for creating a profile
///
/// Missing names and phone are stored as empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

impl CreateProfile {
    /// Materializes the profile row for a user
    pub fn into_profile(self, user_id: Uuid) -> UserProfile {
        UserProfile {
            user_id,
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            avatar_url: None,
        }
    }
}

impl UserProfile {
    /// Inserts the profile for a freshly created user
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
        data: CreateProfile,
    ) -> Result<Self, sqlx::Error> {
        let profile = data.into_profile(user_id);

        sqlx::query_as::<_, UserProfile>(
            r#"
            INSERT INTO user_profiles (user_id, first_name, last_name, phone, avatar_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING user_id, first_name, last_name, phone, avatar_url
            "#,
        )
        .bind(profile.user_id)
        .bind(profile.first_name)
        .bind(profile.last_name)
        .bind(profile.phone)
        .bind(profile.avatar_url)
        .fetch_one(executor)
        .await
    }

    /// Finds the profile for a user
    pub async fn find_by_user<'e, E: PgExecutor<'e>>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, first_name, last_name, phone, avatar_url
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_become_empty_strings() {
        let user_id = Uuid::new_v4();
        let profile = CreateProfile {
            first_name: Some("Ada".to_string()),
            ..Default::default()
        }
        .into_profile(user_id);

        assert_eq!(profile.user_id, user_id);
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name, "");
        assert_eq!(profile.phone, "");
        assert!(profile.avatar_url.is_none());
    }
}
