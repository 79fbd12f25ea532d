/// Database models for usersvc
///
/// # Models
///
/// - `user`: Accounts, roles and credentials
/// - `profile`: Per-user profile fields (1:1 with `user`)
///
/// The SQL here is used by [`crate::store::postgres::PgCredentialStore`];
/// the rest of the crate talks to the [`crate::store::CredentialStore`] trait.

pub mod profile;
pub mod user;
