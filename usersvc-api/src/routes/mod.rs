/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Register, login, logout
/// - `users`: Self and by-id user reads, updates and deactivation

pub mod auth;
pub mod health;
pub mod users;
