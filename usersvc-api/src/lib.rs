//! # User Service API Library
//!
//! HTTP surface of the user service: registration, login/logout and user
//! management on top of `usersvc-shared`.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Active-request gauge and correlation ids
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
