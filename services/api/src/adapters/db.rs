//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `IssueStoreService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Queries are built at runtime (`QueryBuilder`) because the issue filters and
//! patches are dynamic; enums travel as their canonical snake_case strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use water_quality_core::domain::{
    Comment, Coordinates, Issue, IssueChanges, IssueStatus, IssueType, Location,
    ResolutionChange, Severity, WaterSource,
};
use water_quality_core::ports::{
    CommentQuery, IssueQuery, IssueStoreService, PortError, PortResult,
};

const ISSUE_COLUMNS: &str = "id, location_name, location_district, location_region, \
    location_lat, location_lng, reported_by, reported_at, description, water_source, \
    issue_type, severity, status, assigned_to, updated_at, resolved_at, images";

const COMMENT_COLUMNS: &str = "id, issue_id, text, created_at, created_by";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `IssueStoreService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

/// Translates a driver error into the port's vocabulary.
fn port_error(e: sqlx::Error) -> PortError {
    match &e {
        sqlx::Error::RowNotFound => PortError::NotFound(e.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => PortError::Conflict(db.to_string()),
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            PortError::NotFound(db.to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            PortError::Unavailable(e.to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct IssueRecord {
    id: String,
    location_name: String,
    location_district: String,
    location_region: String,
    location_lat: Option<f64>,
    location_lng: Option<f64>,
    reported_by: String,
    reported_at: DateTime<Utc>,
    description: String,
    water_source: String,
    issue_type: String,
    severity: String,
    status: String,
    assigned_to: Option<String>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    images: Vec<String>,
}

impl IssueRecord {
    fn to_domain(self) -> PortResult<Issue> {
        let invalid = |e: &dyn std::fmt::Display| {
            PortError::Unexpected(format!("Issue {} has an invalid row: {}", self.id, e))
        };
        let coordinates = Coordinates::from_parts(self.location_lat, self.location_lng)
            .map_err(|e| invalid(&e))?;
        let water_source = self.water_source.parse::<WaterSource>().map_err(|e| invalid(&e))?;
        let issue_type = self.issue_type.parse::<IssueType>().map_err(|e| invalid(&e))?;
        let severity = self.severity.parse::<Severity>().map_err(|e| invalid(&e))?;
        let status = self.status.parse::<IssueStatus>().map_err(|e| invalid(&e))?;

        Ok(Issue {
            id: self.id,
            location: Location {
                name: self.location_name,
                district: self.location_district,
                region: self.location_region,
                coordinates,
            },
            reported_by: self.reported_by,
            reported_at: self.reported_at,
            description: self.description,
            water_source,
            issue_type,
            severity,
            status,
            assigned_to: self.assigned_to,
            updated_at: self.updated_at,
            resolved_at: self.resolved_at,
            images: self.images,
            comments: Vec::new(),
        })
    }
}

#[derive(FromRow)]
struct CommentRecord {
    id: String,
    issue_id: String,
    text: String,
    created_at: DateTime<Utc>,
    created_by: String,
}

impl CommentRecord {
    fn to_domain(self) -> Comment {
        Comment {
            id: self.id,
            issue_id: self.issue_id,
            text: self.text,
            created_at: self.created_at,
            created_by: self.created_by,
        }
    }
}

//=========================================================================================
// `IssueStoreService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IssueStoreService for DbAdapter {
    async fn query_issues(&self, query: &IssueQuery) -> PortResult<Vec<Issue>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM water_quality_issues WHERE TRUE",
            ISSUE_COLUMNS
        ));
        if let Some(id) = &query.id {
            builder.push(" AND id = ").push_bind(id.clone());
        }
        if let Some(status) = query.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(region) = &query.region {
            builder.push(" AND location_region = ").push_bind(region.clone());
        }
        if let Some(from) = query.reported_from {
            builder.push(" AND reported_at >= ").push_bind(from);
        }
        if let Some(to) = query.reported_to {
            builder.push(" AND reported_at <= ").push_bind(to);
        }
        builder.push(" ORDER BY reported_at DESC");

        let records = builder
            .build_query_as::<IssueRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;

        records.into_iter().map(IssueRecord::to_domain).collect()
    }

    async fn insert_issue(&self, issue: &Issue) -> PortResult<Issue> {
        let coordinates = issue.location.coordinates;
        let sql = format!(
            "INSERT INTO water_quality_issues ({cols}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING {cols}",
            cols = ISSUE_COLUMNS
        );
        let record = sqlx::query_as::<_, IssueRecord>(&sql)
            .bind(&issue.id)
            .bind(&issue.location.name)
            .bind(&issue.location.district)
            .bind(&issue.location.region)
            .bind(coordinates.map(|c| c.lat))
            .bind(coordinates.map(|c| c.lng))
            .bind(&issue.reported_by)
            .bind(issue.reported_at)
            .bind(&issue.description)
            .bind(issue.water_source.as_str())
            .bind(issue.issue_type.as_str())
            .bind(issue.severity.as_str())
            .bind(issue.status.as_str())
            .bind(&issue.assigned_to)
            .bind(issue.updated_at)
            .bind(issue.resolved_at)
            .bind(&issue.images)
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;
        record.to_domain()
    }

    async fn update_issue(&self, id: &str, changes: &IssueChanges) -> PortResult<Issue> {
        let patch = &changes.patch;
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE water_quality_issues SET ");
        {
            let mut set = builder.separated(", ");
            set.push("updated_at = ").push_bind_unseparated(changes.updated_at);
            if let Some(location) = &patch.location {
                set.push("location_name = ").push_bind_unseparated(location.name.clone());
                set.push("location_district = ").push_bind_unseparated(location.district.clone());
                set.push("location_region = ").push_bind_unseparated(location.region.clone());
                set.push("location_lat = ").push_bind_unseparated(location.coordinates.map(|c| c.lat));
                set.push("location_lng = ").push_bind_unseparated(location.coordinates.map(|c| c.lng));
            }
            if let Some(description) = &patch.description {
                set.push("description = ").push_bind_unseparated(description.clone());
            }
            if let Some(water_source) = patch.water_source {
                set.push("water_source = ").push_bind_unseparated(water_source.as_str());
            }
            if let Some(issue_type) = patch.issue_type {
                set.push("issue_type = ").push_bind_unseparated(issue_type.as_str());
            }
            if let Some(severity) = patch.severity {
                set.push("severity = ").push_bind_unseparated(severity.as_str());
            }
            if let Some(status) = patch.status {
                set.push("status = ").push_bind_unseparated(status.as_str());
            }
            if let Some(assigned_to) = &patch.assigned_to {
                set.push("assigned_to = ").push_bind_unseparated(assigned_to.clone());
            }
            if let Some(images) = &patch.images {
                set.push("images = ").push_bind_unseparated(images.clone());
            }
            // Evaluated against the row being replaced, so the stamp follows
            // whatever status the row holds at write time.
            match changes.resolution {
                ResolutionChange::Unchanged => {}
                ResolutionChange::Resolve(at) => {
                    set.push("resolved_at = CASE WHEN status = 'resolved' THEN COALESCE(resolved_at, ")
                        .push_bind_unseparated(at)
                        .push_unseparated(") ELSE ")
                        .push_bind_unseparated(at)
                        .push_unseparated(" END");
                }
                ResolutionChange::Clear => {
                    set.push("resolved_at = NULL");
                }
            }
        }
        builder.push(" WHERE id = ").push_bind(id.to_string());
        builder.push(format!(" RETURNING {}", ISSUE_COLUMNS));

        let record = builder
            .build_query_as::<IssueRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(port_error)?
            .ok_or_else(|| PortError::NotFound(format!("Issue {} not found", id)))?;
        record.to_domain()
    }

    async fn query_comments(&self, query: &CommentQuery) -> PortResult<Vec<Comment>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM water_quality_comments WHERE TRUE",
            COMMENT_COLUMNS
        ));
        if let Some(issue_id) = &query.issue_id {
            builder.push(" AND issue_id = ").push_bind(issue_id.clone());
        }
        builder.push(" ORDER BY created_at ASC, id ASC");

        let records = builder
            .build_query_as::<CommentRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(port_error)?;

        Ok(records.into_iter().map(CommentRecord::to_domain).collect())
    }

    async fn insert_comment(&self, comment: &Comment) -> PortResult<Comment> {
        let sql = format!(
            "INSERT INTO water_quality_comments ({cols}) VALUES ($1, $2, $3, $4, $5) RETURNING {cols}",
            cols = COMMENT_COLUMNS
        );
        let record = sqlx::query_as::<_, CommentRecord>(&sql)
            .bind(&comment.id)
            .bind(&comment.issue_id)
            .bind(&comment.text)
            .bind(comment.created_at)
            .bind(&comment.created_by)
            .fetch_one(&self.pool)
            .await
            .map_err(port_error)?;
        Ok(record.to_domain())
    }
}
