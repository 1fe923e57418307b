//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the dashboard's statistics and report endpoints
//! and the master definition for the OpenAPI specification.

use crate::web::issues;
use crate::web::payloads::{
    counts, CommentResponse, CountEntry, CreateCommentRequest, CreateIssueRequest,
    HealthResponse, IssueResponse, LocationBody, OverviewResponse, ReportParams, ReportResponse,
    TrendEntry, UpdateIssueRequest,
};
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use utoipa::OpenApi;
use water_quality_core::stats::ReportFilter;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        issues::list_issues_handler,
        issues::recent_issues_handler,
        issues::high_priority_handler,
        issues::get_issue_handler,
        issues::create_issue_handler,
        issues::update_issue_handler,
        issues::add_comment_handler,
        overview_handler,
        status_counts_handler,
        severity_counts_handler,
        type_counts_handler,
        region_counts_handler,
        trend_handler,
        regions_handler,
        report_handler,
        health_handler,
    ),
    components(
        schemas(
            IssueResponse, CommentResponse, LocationBody, CreateIssueRequest,
            UpdateIssueRequest, CreateCommentRequest, OverviewResponse, CountEntry,
            TrendEntry, ReportResponse, HealthResponse
        )
    ),
    tags(
        (name = "Water Quality API", description = "Issue tracking and dashboard statistics for reported water quality problems.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Statistics Handlers
//=========================================================================================

/// Headline totals for the dashboard.
#[utoipa::path(
    get,
    path = "/stats/overview",
    responses((status = 200, description = "Totals over the current snapshot", body = OverviewResponse))
)]
pub async fn overview_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let cache = &app_state.cache;
    Ok(Json(OverviewResponse {
        total: cache.total_count(),
        resolved: cache.resolved_count(),
        pending: cache.pending_count(),
        critical_open: cache.critical_open_count(),
        high_priority: cache.high_priority().len(),
        average_resolution_days: cache.average_resolution_days(),
    }))
}

/// Issue counts for every status, including zeros.
#[utoipa::path(
    get,
    path = "/stats/status",
    responses((status = 200, description = "One entry per status", body = [CountEntry]))
)]
pub async fn status_counts_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let by_status = app_state.cache.count_by_status();
    Ok(Json(counts(by_status.iter().map(|(status, n)| (status.as_str(), *n)))))
}

/// Issue counts for every severity, including zeros.
#[utoipa::path(
    get,
    path = "/stats/severity",
    responses((status = 200, description = "One entry per severity", body = [CountEntry]))
)]
pub async fn severity_counts_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let by_severity = app_state.cache.count_by_severity();
    Ok(Json(counts(by_severity.iter().map(|(severity, n)| (severity.as_str(), *n)))))
}

/// Issue counts per type, for the types that occur.
#[utoipa::path(
    get,
    path = "/stats/types",
    responses((status = 200, description = "Types in first-seen order", body = [CountEntry]))
)]
pub async fn type_counts_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let by_type = app_state.cache.count_by_type();
    Ok(Json(counts(by_type.iter().map(|t| (t.issue_type.as_str(), t.count)))))
}

/// Issue counts per region, for the regions that occur.
#[utoipa::path(
    get,
    path = "/stats/regions",
    responses((status = 200, description = "Regions in first-seen order", body = [CountEntry]))
)]
pub async fn region_counts_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let by_region = app_state.cache.count_by_region();
    Ok(Json(counts(by_region.iter().map(|r| (r.region.as_str(), r.count)))))
}

/// Reports per calendar day (UTC).
#[utoipa::path(
    get,
    path = "/stats/trend",
    responses((status = 200, description = "Days with at least one report, oldest first", body = [TrendEntry]))
)]
pub async fn trend_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let trend: Vec<TrendEntry> = app_state
        .cache
        .trend_by_day()
        .iter()
        .map(TrendEntry::from)
        .collect();
    Ok(Json(trend))
}

/// Distinct regions, for filter drop-downs.
#[utoipa::path(
    get,
    path = "/regions",
    responses((status = 200, description = "Sorted region names", body = [String]))
)]
pub async fn regions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    Ok(Json(app_state.cache.unique_regions()))
}

//=========================================================================================
// Reports & Health
//=========================================================================================

/// Every dashboard series, scoped to a reporting window, region and status.
#[utoipa::path(
    get,
    path = "/reports",
    params(ReportParams),
    responses(
        (status = 200, description = "The scoped report", body = ReportResponse),
        (status = 400, description = "`from` is later than `to`, or a parameter is malformed")
    )
)]
pub async fn report_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<ReportParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let (Some(from), Some(to)) = (params.from, params.to) {
        if from > to {
            return Err((
                StatusCode::BAD_REQUEST,
                "`from` must not be later than `to`".to_string(),
            ));
        }
    }
    let scope = ReportFilter {
        from: params.from,
        to: params.to,
        region: params.region,
        status: params.status,
    };
    Ok(Json(ReportResponse::from(&app_state.cache.report(&scope))))
}

/// Cache freshness and refresh failure counters.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Cache health", body = HealthResponse))
)]
pub async fn health_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    Ok(Json(HealthResponse::from(app_state.cache.health())))
}
