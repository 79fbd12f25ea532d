//! # usersvc Shared Library
//!
//! Authentication and account lifecycle for the user service, independent of
//! the HTTP layer.
//!
//! ## Module Organization
//!
//! - `models`: database models and data structures
//! - `db`: connection pool and migrations
//! - `store`: credential store trait with Postgres and in-memory backends
//! - `cache`: session cache trait, sessions and the in-memory backend
//! - `redis`: Redis session cache backend
//! - `auth`: password hashing, tokens, access control
//! - `accounts`: registration, login, logout and account management
//! - `telemetry`: operation spans and their sinks

pub mod accounts;
pub mod auth;
pub mod cache;
pub mod db;
pub mod models;
pub mod redis;
pub mod store;
pub mod telemetry;

/// Current version of the usersvc shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
