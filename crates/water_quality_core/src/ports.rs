//! crates/water_quality_core/src/ports.rs
//!
//! Defines the service contracts (traits) the core needs from the outside world.
//! These traits form the boundary of the hexagonal architecture, allowing the cache
//! and aggregation logic to stay independent of the concrete remote data service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crate::domain::{Comment, Issue, IssueChanges, IssueStatus};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    Conflict(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Query Descriptions
//=========================================================================================

/// Filters for reading rows of the `issues` table.
///
/// Results are always ordered by `reported_at`, newest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IssueQuery {
    pub id: Option<String>,
    pub status: Option<IssueStatus>,
    pub region: Option<String>,
    /// Inclusive lower bound on `reported_at`.
    pub reported_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `reported_at`.
    pub reported_to: Option<DateTime<Utc>>,
}

impl IssueQuery {
    /// Every issue.
    pub fn all() -> Self {
        Self::default()
    }

    /// The single issue with the given id.
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Whether an issue satisfies every filter in this query.
    pub fn matches(&self, issue: &Issue) -> bool {
        self.id.as_deref().map_or(true, |id| issue.id == id)
            && self.status.map_or(true, |status| issue.status == status)
            && self
                .region
                .as_deref()
                .map_or(true, |region| issue.location.region == region)
            && self.reported_from.map_or(true, |from| issue.reported_at >= from)
            && self.reported_to.map_or(true, |to| issue.reported_at <= to)
    }
}

/// Filters for reading rows of the `comments` table, ordered by `created_at` ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentQuery {
    pub issue_id: Option<String>,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The remote tabular data service holding issues and their comments.
#[async_trait]
pub trait IssueStoreService: Send + Sync {
    // --- Issues ---
    /// Returned issues carry no comments; those live in their own table.
    async fn query_issues(&self, query: &IssueQuery) -> PortResult<Vec<Issue>>;

    async fn insert_issue(&self, issue: &Issue) -> PortResult<Issue>;

    async fn update_issue(&self, id: &str, changes: &IssueChanges) -> PortResult<Issue>;

    // --- Comments ---
    async fn query_comments(&self, query: &CommentQuery) -> PortResult<Vec<Comment>>;

    async fn insert_comment(&self, comment: &Comment) -> PortResult<Comment>;
}
