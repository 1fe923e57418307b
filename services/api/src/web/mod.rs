pub mod issues;
pub mod payloads;
pub mod rest;
pub mod state;

use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

pub use rest::ApiDoc;

/// Builds the API router: every issue, stats and report route, with CORS for the
/// dashboard origin and request tracing.
pub fn router(app_state: Arc<AppState>) -> Router {
    let mut api_router = Router::new()
        .route(
            "/issues",
            get(issues::list_issues_handler).post(issues::create_issue_handler),
        )
        .route("/issues/recent", get(issues::recent_issues_handler))
        .route("/issues/high-priority", get(issues::high_priority_handler))
        .route(
            "/issues/{id}",
            get(issues::get_issue_handler).patch(issues::update_issue_handler),
        )
        .route("/issues/{id}/comments", post(issues::add_comment_handler))
        .route("/stats/overview", get(rest::overview_handler))
        .route("/stats/status", get(rest::status_counts_handler))
        .route("/stats/severity", get(rest::severity_counts_handler))
        .route("/stats/types", get(rest::type_counts_handler))
        .route("/stats/regions", get(rest::region_counts_handler))
        .route("/stats/trend", get(rest::trend_handler))
        .route("/regions", get(rest::regions_handler))
        .route("/reports", get(rest::report_handler))
        .route("/health", get(rest::health_handler))
        .layer(TraceLayer::new_for_http());

    match app_state.config.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
                .allow_headers([CONTENT_TYPE, ACCEPT]);
            api_router = api_router.layer(cors);
        }
        Err(e) => {
            warn!(origin = %app_state.config.cors_origin, error = %e, "Ignoring an invalid CORS origin.");
        }
    }

    api_router.with_state(app_state)
}
