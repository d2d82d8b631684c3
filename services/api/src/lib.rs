//! Blog API service
//!
//! User and tag management over PostgreSQL with a Redis-backed response and
//! value cache. The binary in `main.rs` wires the shared components from the
//! `common` crate into [`state::AppState`] and serves [`routes::create_router`].

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;
