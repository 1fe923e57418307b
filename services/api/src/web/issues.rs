//! services/api/src/web/issues.rs
//!
//! Handlers for reading and writing individual issues. Reads are served from the
//! cache snapshot; writes go through the `IssueService`, which persists to the
//! store first and refreshes the cache afterwards.

use crate::web::payloads::{
    CommentResponse, CreateCommentRequest, CreateIssueRequest, IssueResponse, ListIssuesParams,
    RecentParams, UpdateIssueRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, warn};
use water_quality_core::domain::Issue;
use water_quality_core::mutations::{MutationError, ValidationError};
use water_quality_core::ports::PortError;
use water_quality_core::stats::IssueFilter;

const DEFAULT_RECENT_LIMIT: usize = 5;

/// Maps a failed mutation onto the status code the client should see.
pub fn mutation_error(e: MutationError) -> (StatusCode, String) {
    let status = match &e {
        MutationError::Invalid(_) => StatusCode::BAD_REQUEST,
        MutationError::NotFound(_) => StatusCode::NOT_FOUND,
        MutationError::Store(PortError::Conflict(_)) => StatusCode::CONFLICT,
        MutationError::Store(PortError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        MutationError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!(error = %e, "Issue mutation failed.");
    } else {
        warn!(error = %e, "Issue mutation rejected.");
    }
    (status, e.to_string())
}

fn responses(issues: &[Issue]) -> Vec<IssueResponse> {
    issues.iter().map(IssueResponse::from).collect()
}

/// List issues, optionally filtered by search text, status, severity and region.
#[utoipa::path(
    get,
    path = "/issues",
    params(ListIssuesParams),
    responses(
        (status = 200, description = "Matching issues in snapshot order", body = [IssueResponse]),
        (status = 400, description = "Unknown status or severity")
    )
)]
pub async fn list_issues_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ListIssuesParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let filter = IssueFilter {
        search: params.search,
        status: params.status,
        severity: params.severity,
        region: params.region,
    };
    Ok(Json(responses(&app_state.cache.filter(&filter))))
}

/// The most recently reported issues.
#[utoipa::path(
    get,
    path = "/issues/recent",
    params(RecentParams),
    responses(
        (status = 200, description = "Newest issues first", body = [IssueResponse])
    )
)]
pub async fn recent_issues_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
    Ok(Json(responses(&app_state.cache.recent(limit))))
}

/// Open high and critical issues.
#[utoipa::path(
    get,
    path = "/issues/high-priority",
    responses(
        (status = 200, description = "Unresolved high or critical issues", body = [IssueResponse])
    )
)]
pub async fn high_priority_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    Ok(Json(responses(&app_state.cache.high_priority())))
}

/// Fetch a single issue with its comments.
#[utoipa::path(
    get,
    path = "/issues/{id}",
    params(("id" = String, Path, description = "The issue id, e.g. WQI-001")),
    responses(
        (status = 200, description = "The issue", body = IssueResponse),
        (status = 404, description = "No such issue in the current snapshot")
    )
)]
pub async fn get_issue_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .cache
        .find(&id)
        .map(|issue| Json(IssueResponse::from(&issue)))
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Issue {} not found", id)))
}

/// Report a new issue. It starts out `pending`.
#[utoipa::path(
    post,
    path = "/issues",
    request_body = CreateIssueRequest,
    responses(
        (status = 201, description = "Issue stored", body = IssueResponse),
        (status = 400, description = "A required field is blank or the coordinates are invalid"),
        (status = 503, description = "The issue store is unavailable")
    )
)]
pub async fn create_issue_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<CreateIssueRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let fields = payload
        .into_domain()
        .map_err(|e| mutation_error(ValidationError::from(e).into()))?;
    let issue = app_state
        .issues
        .create_issue(fields)
        .await
        .map_err(mutation_error)?;
    Ok((StatusCode::CREATED, Json(IssueResponse::from(&issue))))
}

/// Update the fields present in the body. Moving to or away from `resolved`
/// maintains `resolved_at`.
#[utoipa::path(
    patch,
    path = "/issues/{id}",
    params(("id" = String, Path, description = "The issue id")),
    request_body = UpdateIssueRequest,
    responses(
        (status = 200, description = "The updated issue", body = IssueResponse),
        (status = 400, description = "A patched field is blank or invalid"),
        (status = 404, description = "No such issue"),
        (status = 503, description = "The issue store is unavailable")
    )
)]
pub async fn update_issue_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateIssueRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let patch = payload
        .into_domain()
        .map_err(|e| mutation_error(ValidationError::from(e).into()))?;
    let issue = app_state
        .issues
        .update_issue(&id, patch)
        .await
        .map_err(mutation_error)?;
    Ok(Json(IssueResponse::from(&issue)))
}

/// Append a comment to an issue.
#[utoipa::path(
    post,
    path = "/issues/{id}/comments",
    params(("id" = String, Path, description = "The issue id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment stored", body = CommentResponse),
        (status = 400, description = "Blank text or author"),
        (status = 404, description = "No such issue"),
        (status = 503, description = "The issue store is unavailable")
    )
)]
pub async fn add_comment_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let comment = app_state
        .issues
        .add_comment(&id, &payload.text, &payload.author)
        .await
        .map_err(mutation_error)?;
    Ok((StatusCode::CREATED, Json(CommentResponse::from(&comment))))
}
