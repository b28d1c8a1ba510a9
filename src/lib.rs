//! Orbis Library Circulation Server
//!
//! Tracks how many copies of each circulating document exist, who holds
//! them and who is waiting for them, and keeps those facts consistent
//! under concurrent access. Exposes a REST JSON API for borrowing,
//! reserving, returning and auditing.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
