//! Application state shared across handlers

use std::sync::Arc;

use common::cache::CacheService;
use common::state::ConnectionTracker;

use crate::config::Settings;
use crate::services::{ExpansionService, TagService, UserService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub cache: CacheService,
    /// Connection state of the database provider, reported by `/health`
    pub database: ConnectionTracker,
    pub users: UserService,
    pub tags: TagService,
    pub expansion: ExpansionService,
}
