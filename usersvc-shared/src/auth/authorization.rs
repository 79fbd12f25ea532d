/// Authorization checks
///
/// One rule covers every user-scoped endpoint: a caller may act on an
/// account if it is their own or if they are an admin.
///
/// # Example
///
/// ```
/// use usersvc_shared::auth::authorization::{can_access, require_access, Identity};
/// use usersvc_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// let me = Identity { user_id: Uuid::new_v4(), role: UserRole::User };
/// let someone_else = Uuid::new_v4();
///
/// assert!(can_access(&me, me.user_id));
/// assert!(!can_access(&me, someone_else));
/// assert!(require_access(&me, someone_else).is_err());
/// ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// Error type for authorization checks
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    /// Caller is neither the target user nor an admin
    #[error("Access denied")]
    Forbidden,
}

/// Who is making the request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: UserRole,
}

/// Self-or-admin predicate
pub fn can_access(identity: &Identity, target: Uuid) -> bool {
    identity.user_id == target || identity.role.is_admin()
}

/// [`can_access`] as a `Result`
pub fn require_access(identity: &Identity, target: Uuid) -> Result<(), AuthzError> {
    if can_access(identity, target) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}
