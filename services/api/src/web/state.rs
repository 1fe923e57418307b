//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use water_quality_core::{IssueCache, IssueService};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: IssueCache,
    pub issues: IssueService,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires the write service to the same cache the read handlers use.
    pub fn new(cache: IssueCache, config: Arc<Config>) -> Self {
        Self {
            issues: IssueService::new(cache.clone()),
            cache,
            config,
        }
    }
}
