//! crates/water_quality_core/src/mutations.rs
//!
//! Write-through helpers. Every mutation is validated, persisted through the
//! `IssueStoreService` port, and followed by a fire-and-forget cache refresh.
//! The in-memory snapshot is never patched directly.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::IssueCache;
use crate::clock::Clock;
use crate::domain::{
    Comment, CoordinatesError, Issue, IssueChanges, IssuePatch, IssueStatus, Location, NewIssue,
    ResolutionChange,
};
use crate::ports::{CommentQuery, IssueStoreService, PortError};

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} must not be blank")]
    Blank(&'static str),
    #[error(transparent)]
    Coordinates(#[from] CoordinatesError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("Invalid input: {0}")]
    Invalid(#[from] ValidationError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Store error: {0}")]
    Store(PortError),
}

impl From<PortError> for MutationError {
    fn from(error: PortError) -> Self {
        match error {
            PortError::NotFound(what) => MutationError::NotFound(what),
            other => MutationError::Store(other),
        }
    }
}

pub type MutationResult<T> = Result<T, MutationError>;

//=========================================================================================
// Validation
//=========================================================================================

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank(field))
    } else {
        Ok(())
    }
}

fn validate_location(location: &Location) -> Result<(), ValidationError> {
    require("location name", &location.name)?;
    require("location district", &location.district)?;
    require("location region", &location.region)?;
    if let Some(coordinates) = location.coordinates {
        crate::domain::Coordinates::from_parts(Some(coordinates.lat), Some(coordinates.lng))?;
    }
    Ok(())
}

fn validate_new_issue(fields: &NewIssue) -> Result<(), ValidationError> {
    validate_location(&fields.location)?;
    require("reporter", &fields.reported_by)?;
    require("description", &fields.description)
}

fn validate_patch(patch: &IssuePatch) -> Result<(), ValidationError> {
    if let Some(location) = &patch.location {
        validate_location(location)?;
    }
    if let Some(description) = &patch.description {
        require("description", description)?;
    }
    if let Some(Some(assignee)) = &patch.assigned_to {
        require("assignee", assignee)?;
    }
    Ok(())
}

//=========================================================================================
// The Service
//=========================================================================================

/// Write API over the store, refreshing the shared cache after each success.
#[derive(Clone)]
pub struct IssueService {
    store: Arc<dyn IssueStoreService>,
    cache: IssueCache,
    clock: Arc<dyn Clock>,
}

impl IssueService {
    /// Writes go to the same store and clock the cache reads from.
    pub fn new(cache: IssueCache) -> Self {
        Self {
            store: cache.store(),
            clock: cache.clock(),
            cache,
        }
    }

    pub fn cache(&self) -> &IssueCache {
        &self.cache
    }

    /// Reports a new issue. It starts `pending` and unresolved.
    pub async fn create_issue(&self, fields: NewIssue) -> MutationResult<Issue> {
        validate_new_issue(&fields)?;
        let now = self.clock.now();
        let issue = Issue {
            id: fresh_id("WQI", now),
            location: fields.location,
            reported_by: fields.reported_by,
            reported_at: fields.reported_at.unwrap_or(now),
            description: fields.description,
            water_source: fields.water_source,
            issue_type: fields.issue_type,
            severity: fields.severity,
            status: IssueStatus::Pending,
            assigned_to: None,
            updated_at: now,
            resolved_at: None,
            images: fields.images,
            comments: Vec::new(),
        };

        let stored = self
            .cache
            .bounded(self.store.insert_issue(&issue))
            .await
            .map_err(|e| {
                warn!(issue_id = %issue.id, error = %e, "Failed to create issue.");
                MutationError::from(e)
            })?;
        info!(issue_id = %stored.id, severity = %stored.severity, "Issue created.");
        self.cache.spawn_refresh();
        Ok(stored)
    }

    /// Applies the fields present in `patch`, maintaining `resolved_at`.
    ///
    /// The resolution stamp is decided by the store against the row it writes,
    /// so a concurrent reopen cannot leave a resolved issue without a stamp.
    pub async fn update_issue(&self, id: &str, patch: IssuePatch) -> MutationResult<Issue> {
        validate_patch(&patch)?;
        let now = self.clock.now();
        let changes = IssueChanges {
            resolution: ResolutionChange::for_status(patch.status, now),
            patch,
            updated_at: now,
        };

        let mut updated = self
            .cache
            .bounded(self.store.update_issue(id, &changes))
            .await
            .map_err(|e| {
                warn!(issue_id = %id, error = %e, "Failed to update issue.");
                MutationError::from(e)
            })?;
        info!(issue_id = %id, status = %updated.status, "Issue updated.");
        self.cache.spawn_refresh();

        updated.comments = self.comments_for(id).await;
        Ok(updated)
    }

    /// The issue's comments as stored. The write already succeeded, so a failed
    /// lookup falls back to a populated snapshot rather than failing the call.
    async fn comments_for(&self, id: &str) -> Vec<Comment> {
        let query = CommentQuery {
            issue_id: Some(id.to_string()),
        };
        match self.cache.bounded(self.store.query_comments(&query)).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(issue_id = %id, error = %e, "Failed to load comments for updated issue.");
                if self.cache.is_populated() {
                    self.cache.find(id).map(|issue| issue.comments).unwrap_or_default()
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Appends a comment to an issue.
    pub async fn add_comment(
        &self,
        issue_id: &str,
        text: &str,
        author: &str,
    ) -> MutationResult<Comment> {
        require("comment text", text)?;
        require("comment author", author)?;
        let now = self.clock.now();
        let comment = Comment {
            id: fresh_id("c", now),
            issue_id: issue_id.to_string(),
            text: text.to_string(),
            created_at: now,
            created_by: author.to_string(),
        };

        let stored = self
            .cache
            .bounded(self.store.insert_comment(&comment))
            .await
            .map_err(|e| {
                warn!(issue_id = %issue_id, error = %e, "Failed to add comment.");
                MutationError::from(e)
            })?;
        info!(issue_id = %issue_id, comment_id = %stored.id, "Comment added.");
        self.cache.spawn_refresh();
        Ok(stored)
    }
}

/// A time-based token with a random suffix, e.g. `WQI-1742031000000-3f9a1c2b`.
fn fresh_id(prefix: &str, now: chrono::DateTime<chrono::Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, now.timestamp_millis(), &suffix[..8])
}
