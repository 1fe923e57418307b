//! crates/water_quality_core/src/memory.rs
//!
//! An in-process implementation of the `IssueStoreService` port. It backs the
//! service when no database is configured and stands in for the remote store in tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::{Comment, Issue, IssueChanges};
use crate::ports::{CommentQuery, IssueQuery, IssueStoreService, PortError, PortResult};

#[derive(Default)]
struct Tables {
    issues: Vec<Issue>,
    comments: Vec<Comment>,
}

/// Holds the `issues` and `comments` tables in memory.
pub struct MemoryIssueStore {
    tables: RwLock<Tables>,
    available: AtomicBool,
    issue_queries: AtomicUsize,
}

impl MemoryIssueStore {
    pub fn new() -> Self {
        Self::with_issues(Vec::new())
    }

    /// Creates a store preloaded with issues. Embedded comments are moved into
    /// the comments table.
    pub fn with_issues(issues: Vec<Issue>) -> Self {
        let mut tables = Tables::default();
        for mut issue in issues {
            tables.comments.append(&mut issue.comments);
            tables.issues.push(issue);
        }
        Self {
            tables: RwLock::new(tables),
            available: AtomicBool::new(true),
            issue_queries: AtomicUsize::new(0),
        }
    }

    /// Simulates the remote service going down (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `query_issues` calls served so far, failed ones included.
    pub fn issue_query_count(&self) -> usize {
        self.issue_queries.load(Ordering::SeqCst)
    }

    fn ensure_available(&self) -> PortResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PortError::Unavailable("memory store is offline".to_string()))
        }
    }
}

impl Default for MemoryIssueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IssueStoreService for MemoryIssueStore {
    async fn query_issues(&self, query: &IssueQuery) -> PortResult<Vec<Issue>> {
        self.issue_queries.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let mut issues: Vec<Issue> = tables
            .issues
            .iter()
            .filter(|issue| query.matches(issue))
            .cloned()
            .collect();
        issues.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
        Ok(issues)
    }

    async fn insert_issue(&self, issue: &Issue) -> PortResult<Issue> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        if tables.issues.iter().any(|existing| existing.id == issue.id) {
            return Err(PortError::Conflict(format!("Issue {} already exists", issue.id)));
        }
        let mut stored = issue.clone();
        stored.comments.clear();
        tables.issues.push(stored.clone());
        Ok(stored)
    }

    async fn update_issue(&self, id: &str, changes: &IssueChanges) -> PortResult<Issue> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        let issue = tables
            .issues
            .iter_mut()
            .find(|issue| issue.id == id)
            .ok_or_else(|| PortError::NotFound(format!("Issue {} not found", id)))?;
        changes.apply_to(issue);
        Ok(issue.clone())
    }

    async fn query_comments(&self, query: &CommentQuery) -> PortResult<Vec<Comment>> {
        self.ensure_available()?;
        let tables = self.tables.read().await;
        let mut comments: Vec<Comment> = tables
            .comments
            .iter()
            .filter(|c| query.issue_id.as_deref().map_or(true, |id| c.issue_id == id))
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: &Comment) -> PortResult<Comment> {
        self.ensure_available()?;
        let mut tables = self.tables.write().await;
        if !tables.issues.iter().any(|issue| issue.id == comment.issue_id) {
            return Err(PortError::NotFound(format!(
                "Issue {} not found",
                comment.issue_id
            )));
        }
        if tables.comments.iter().any(|existing| existing.id == comment.id) {
            return Err(PortError::Conflict(format!(
                "Comment {} already exists",
                comment.id
            )));
        }
        tables.comments.push(comment.clone());
        Ok(comment.clone())
    }
}
