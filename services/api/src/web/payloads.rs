//! services/api/src/web/payloads.rs
//!
//! Request and response bodies for the REST API. These are kept separate from the
//! core domain types so the wire format can evolve without touching the core.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use water_quality_core::domain::{
    Comment, Coordinates, CoordinatesError, Issue, IssuePatch, IssueStatus, IssueType, Location,
    NewIssue, Severity, WaterSource,
};
use water_quality_core::stats::{DailyCount, ReportSummary};
use water_quality_core::CacheHealth;

//=========================================================================================
// Shared Shapes
//=========================================================================================

/// A place, with the coordinates flattened into an optional pair.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocationBody {
    pub name: String,
    pub district: String,
    pub region: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

impl LocationBody {
    pub fn into_domain(self) -> Result<Location, CoordinatesError> {
        Ok(Location {
            coordinates: Coordinates::from_parts(self.lat, self.lng)?,
            name: self.name,
            district: self.district,
            region: self.region,
        })
    }
}

impl From<&Location> for LocationBody {
    fn from(location: &Location) -> Self {
        Self {
            name: location.name.clone(),
            district: location.district.clone(),
            region: location.region.clone(),
            lat: location.coordinates.map(|c| c.lat),
            lng: location.coordinates.map(|c| c.lng),
        }
    }
}

/// A label and how many issues carry it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CountEntry {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrendEntry {
    pub date: NaiveDate,
    pub count: usize,
}

impl From<&DailyCount> for TrendEntry {
    fn from(day: &DailyCount) -> Self {
        Self {
            date: day.date,
            count: day.count,
        }
    }
}

//=========================================================================================
// Issue Payloads
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CommentResponse {
    pub id: String,
    pub issue_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl From<&Comment> for CommentResponse {
    fn from(comment: &Comment) -> Self {
        Self {
            id: comment.id.clone(),
            issue_id: comment.issue_id.clone(),
            text: comment.text.clone(),
            created_at: comment.created_at,
            created_by: comment.created_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssueResponse {
    pub id: String,
    pub location: LocationBody,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub description: String,
    #[schema(value_type = String, example = "well")]
    pub water_source: WaterSource,
    #[schema(value_type = String, example = "contamination")]
    pub issue_type: IssueType,
    #[schema(value_type = String, example = "high")]
    pub severity: Severity,
    #[schema(value_type = String, example = "pending")]
    pub status: IssueStatus,
    pub assigned_to: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub high_priority: bool,
    pub comments: Vec<CommentResponse>,
}

impl From<&Issue> for IssueResponse {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            location: LocationBody::from(&issue.location),
            reported_by: issue.reported_by.clone(),
            reported_at: issue.reported_at,
            description: issue.description.clone(),
            water_source: issue.water_source,
            issue_type: issue.issue_type,
            severity: issue.severity,
            status: issue.status,
            assigned_to: issue.assigned_to.clone(),
            updated_at: issue.updated_at,
            resolved_at: issue.resolved_at,
            images: issue.images.clone(),
            high_priority: issue.is_high_priority(),
            comments: issue.comments.iter().map(CommentResponse::from).collect(),
        }
    }
}

/// The payload for reporting a new issue.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateIssueRequest {
    pub location: LocationBody,
    pub reported_by: String,
    /// Defaults to the time the request is handled.
    #[serde(default)]
    pub reported_at: Option<DateTime<Utc>>,
    pub description: String,
    #[schema(value_type = String, example = "tap")]
    pub water_source: WaterSource,
    #[schema(value_type = String, example = "color")]
    pub issue_type: IssueType,
    #[schema(value_type = String, example = "medium")]
    pub severity: Severity,
    #[serde(default)]
    pub images: Vec<String>,
}

impl CreateIssueRequest {
    pub fn into_domain(self) -> Result<NewIssue, CoordinatesError> {
        Ok(NewIssue {
            location: self.location.into_domain()?,
            reported_by: self.reported_by,
            reported_at: self.reported_at,
            description: self.description,
            water_source: self.water_source,
            issue_type: self.issue_type,
            severity: self.severity,
            images: self.images,
        })
    }
}

/// A partial update. Omitted fields are left unchanged; `assigned_to: null`
/// (or an empty string) unassigns the issue.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateIssueRequest {
    #[serde(default)]
    pub location: Option<LocationBody>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub water_source: Option<WaterSource>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub severity: Option<Severity>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<IssueStatus>,
    #[serde(default, deserialize_with = "present_or_null")]
    #[schema(value_type = Option<String>)]
    pub assigned_to: Option<Option<String>>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

/// Tells a field that is present but `null` apart from one that is missing.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(Some(value.filter(|s| !s.trim().is_empty())))
}

impl UpdateIssueRequest {
    pub fn into_domain(self) -> Result<IssuePatch, CoordinatesError> {
        Ok(IssuePatch {
            location: self.location.map(LocationBody::into_domain).transpose()?,
            description: self.description,
            water_source: self.water_source,
            issue_type: self.issue_type,
            severity: self.severity,
            status: self.status,
            assigned_to: self.assigned_to,
            images: self.images,
        })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub text: String,
    pub author: String,
}

//=========================================================================================
// Query Parameters
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListIssuesParams {
    /// Case-insensitive match on location name, description or reporter.
    pub search: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<IssueStatus>,
    #[param(value_type = Option<String>)]
    pub severity: Option<Severity>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentParams {
    /// How many issues to return (default 5).
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportParams {
    /// Earliest `reported_at` to include.
    pub from: Option<DateTime<Utc>>,
    /// Latest `reported_at` to include.
    pub to: Option<DateTime<Utc>>,
    pub region: Option<String>,
    #[param(value_type = Option<String>)]
    pub status: Option<IssueStatus>,
}

//=========================================================================================
// Stats, Reports & Health
//=========================================================================================

/// The headline numbers on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OverviewResponse {
    pub total: usize,
    pub resolved: usize,
    pub pending: usize,
    pub critical_open: usize,
    pub high_priority: usize,
    pub average_resolution_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportResponse {
    pub by_status: Vec<CountEntry>,
    pub by_severity: Vec<CountEntry>,
    pub by_type: Vec<CountEntry>,
    pub by_region: Vec<CountEntry>,
    pub trend: Vec<TrendEntry>,
    pub total: usize,
    pub resolved: usize,
    pub pending: usize,
    pub average_resolution_days: f64,
}

impl From<&ReportSummary> for ReportResponse {
    fn from(summary: &ReportSummary) -> Self {
        Self {
            by_status: counts(summary.by_status.iter().map(|(k, v)| (k.as_str(), *v))),
            by_severity: counts(summary.by_severity.iter().map(|(k, v)| (k.as_str(), *v))),
            by_type: counts(summary.by_type.iter().map(|t| (t.issue_type.as_str(), t.count))),
            by_region: counts(summary.by_region.iter().map(|r| (r.region.as_str(), r.count))),
            trend: summary.trend.iter().map(TrendEntry::from).collect(),
            total: summary.total,
            resolved: summary.resolved,
            pending: summary.pending,
            average_resolution_days: summary.average_resolution_days,
        }
    }
}

/// Turns `(label, count)` pairs into response entries, keeping their order.
pub fn counts<'a>(pairs: impl IntoIterator<Item = (&'a str, usize)>) -> Vec<CountEntry> {
    pairs
        .into_iter()
        .map(|(label, count)| CountEntry {
            label: label.to_string(),
            count,
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `ok`, or `degraded` while the cache is on seed data or failing to refresh.
    pub status: String,
    pub populated: bool,
    pub issue_count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub consecutive_failures: u64,
    pub total_failures: u64,
    pub total_refreshes: u64,
}

impl From<CacheHealth> for HealthResponse {
    fn from(health: CacheHealth) -> Self {
        let status = if health.populated && health.consecutive_failures == 0 {
            "ok"
        } else {
            "degraded"
        };
        Self {
            status: status.to_string(),
            populated: health.populated,
            issue_count: health.issue_count,
            last_refresh: health.last_refresh,
            consecutive_failures: health.consecutive_failures,
            total_failures: health.total_failures,
            total_refreshes: health.total_refreshes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigned_to_distinguishes_missing_from_null() {
        let missing: UpdateIssueRequest = serde_json::from_str(r#"{"status":"resolved"}"#).unwrap();
        assert_eq!(missing.assigned_to, None);
        assert_eq!(missing.status, Some(IssueStatus::Resolved));

        let cleared: UpdateIssueRequest = serde_json::from_str(r#"{"assigned_to":null}"#).unwrap();
        assert_eq!(cleared.assigned_to, Some(None));

        let blank: UpdateIssueRequest = serde_json::from_str(r#"{"assigned_to":"  "}"#).unwrap();
        assert_eq!(blank.assigned_to, Some(None));

        let set: UpdateIssueRequest =
            serde_json::from_str(r#"{"assigned_to":"Engineer Salim"}"#).unwrap();
        assert_eq!(set.assigned_to, Some(Some("Engineer Salim".to_string())));
    }

    #[test]
    fn half_a_coordinate_pair_is_rejected() {
        let body = LocationBody {
            name: "Kariakoo Market".into(),
            district: "Ilala".into(),
            region: "Dar es Salaam".into(),
            lat: Some(-6.8),
            lng: None,
        };
        assert!(body.into_domain().is_err());
    }

    #[test]
    fn health_is_degraded_until_a_refresh_succeeds() {
        let health = CacheHealth {
            populated: false,
            issue_count: 0,
            last_refresh: None,
            consecutive_failures: 0,
            total_failures: 0,
            total_refreshes: 0,
        };
        assert_eq!(HealthResponse::from(health.clone()).status, "degraded");

        let healthy = CacheHealth {
            populated: true,
            issue_count: 10,
            total_refreshes: 1,
            ..health
        };
        assert_eq!(HealthResponse::from(healthy).status, "ok");
    }
}
