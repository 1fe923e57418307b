//! Drives the REST router end to end over the in-memory issue store.

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use water_quality_core::seed::seed_issues;
use water_quality_core::{CacheConfig, IssueCache, MemoryIssueStore, RefreshOutcome};

struct TestApp {
    router: Router,
    cache: IssueCache,
    store: Arc<MemoryIssueStore>,
}

impl TestApp {
    /// A router whose store holds the seed issues, with the cache already filled.
    async fn seeded() -> Self {
        let app = Self::over(MemoryIssueStore::with_issues((*seed_issues()).clone()));
        assert_eq!(
            app.cache.force_refresh().await,
            RefreshOutcome::Refreshed { issues: 10 }
        );
        app
    }

    fn over(store: MemoryIssueStore) -> Self {
        let store = Arc::new(store);
        let cache = IssueCache::new(store.clone(), CacheConfig::default());
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        let state = Arc::new(AppState::new(cache.clone(), config));
        Self {
            router: web::router(state),
            cache,
            store,
        }
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn send_json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body)
    }
}

fn ids(body: &Value) -> Vec<&str> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|issue| issue["id"].as_str().unwrap())
        .collect()
}

fn new_issue(description: &str) -> Value {
    json!({
        "location": {
            "name": "Kariakoo Market",
            "district": "Ilala",
            "region": "Dar es Salaam",
            "lat": -6.8190,
            "lng": 39.2740
        },
        "reported_by": "Neema Mushi",
        "description": description,
        "water_source": "tap",
        "issue_type": "color",
        "severity": "critical"
    })
}

#[tokio::test]
async fn overview_and_breakdowns_reflect_the_snapshot() {
    let app = TestApp::seeded().await;

    let (status, overview) = app.get("/stats/overview").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["total"], 10);
    assert_eq!(overview["resolved"], 2);
    assert_eq!(overview["pending"], 1);
    assert_eq!(overview["critical_open"], 3);
    assert_eq!(overview["high_priority"], 5);

    let (_, by_status) = app.get("/stats/status").await;
    let labels: Vec<&str> = by_status
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["label"].as_str().unwrap())
        .collect();
    assert_eq!(
        labels,
        ["pending", "investigating", "in_progress", "resolved", "rejected"]
    );

    let (_, by_severity) = app.get("/stats/severity").await;
    assert_eq!(by_severity[0], json!({"label": "low", "count": 0}));
    assert_eq!(by_severity[3], json!({"label": "critical", "count": 3}));

    let (_, regions) = app.get("/regions").await;
    assert_eq!(regions, json!(["Dar es Salaam"]));

    let (_, trend) = app.get("/stats/trend").await;
    assert_eq!(trend[0]["date"], "2025-03-10");
}

#[tokio::test]
async fn issue_lists_are_filtered_and_ordered() {
    let app = TestApp::seeded().await;

    let (status, recent) = app.get("/issues/recent?limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ids(&recent), ["WQI-006", "WQI-005", "WQI-008"]);

    let (_, critical) = app.get("/issues?severity=critical").await;
    assert_eq!(critical.as_array().unwrap().len(), 3);

    let (_, urgent) = app.get("/issues/high-priority").await;
    assert_eq!(urgent.as_array().unwrap().len(), 5);
    assert!(urgent
        .as_array()
        .unwrap()
        .iter()
        .all(|issue| issue["high_priority"] == true));

    let (status, _) = app.get("/issues?status=flooded").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn single_issue_lookup_includes_comments() {
    let app = TestApp::seeded().await;

    let (status, issue) = app.get("/issues/WQI-001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(issue["status"], "in_progress");
    assert_eq!(issue["location"]["district"], "Kinondoni");
    assert_eq!(issue["comments"].as_array().unwrap().len(), 2);

    let (status, _) = app.get("/issues/WQI-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_issue_appears_after_the_refresh() {
    let app = TestApp::seeded().await;

    let (status, created) = app
        .send_json(Method::POST, "/issues", new_issue("Water is brown since this morning."))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["resolved_at"], Value::Null);
    let id = created["id"].as_str().unwrap().to_string();
    assert!(id.starts_with("WQI-"));

    app.cache.force_refresh().await;
    let (_, overview) = app.get("/stats/overview").await;
    assert_eq!(overview["total"], 11);
    assert_eq!(overview["critical_open"], 4);

    let (status, fetched) = app.get(&format!("/issues/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["location"]["name"], "Kariakoo Market");
}

#[tokio::test]
async fn writes_refresh_the_dashboard_without_a_manual_refresh() {
    let app = TestApp::seeded().await;

    let (status, _) = app
        .send_json(Method::POST, "/issues", new_issue("No water since Sunday."))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut total = Value::Null;
    for _ in 0..100 {
        total = app.get("/stats/overview").await.1["total"].clone();
        if total == 11 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(total, 11);
}

#[tokio::test]
async fn invalid_input_is_rejected_before_the_store() {
    let app = TestApp::seeded().await;

    let (status, _) = app
        .send_json(Method::POST, "/issues", new_issue("   "))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut half_coordinates = new_issue("Low pressure all week.");
    half_coordinates["location"]["lng"] = Value::Null;
    let (status, _) = app
        .send_json(Method::POST, "/issues", half_coordinates)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send_json(
            Method::POST,
            "/issues/WQI-001/comments",
            json!({"text": "", "author": "Engineer Juma"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.cache.force_refresh().await;
    let (_, overview) = app.get("/stats/overview").await;
    assert_eq!(overview["total"], 10);
}

#[tokio::test]
async fn resolving_an_issue_stamps_resolved_at() {
    let app = TestApp::seeded().await;

    let (status, updated) = app
        .send_json(
            Method::PATCH,
            "/issues/WQI-001",
            json!({"status": "resolved"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "resolved");
    assert!(updated["resolved_at"].is_string());
    assert_eq!(updated["assigned_to"], "Engineer Juma");

    let (_, reopened) = app
        .send_json(
            Method::PATCH,
            "/issues/WQI-001",
            json!({"status": "investigating", "assigned_to": null}),
        )
        .await;
    assert_eq!(reopened["resolved_at"], Value::Null);
    assert_eq!(reopened["assigned_to"], Value::Null);

    let (status, _) = app
        .send_json(Method::PATCH, "/issues/WQI-999", json!({"status": "resolved"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_are_appended_in_order() {
    let app = TestApp::seeded().await;

    let (status, comment) = app
        .send_json(
            Method::POST,
            "/issues/WQI-005/comments",
            json!({"text": "Site visit booked.", "author": "Engineer Amani"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(comment["issue_id"], "WQI-005");

    app.cache.force_refresh().await;
    let (_, issue) = app.get("/issues/WQI-005").await;
    let comments = issue["comments"].as_array().unwrap();
    assert_eq!(comments.last().unwrap()["text"], "Site visit booked.");

    let (status, _) = app
        .send_json(
            Method::POST,
            "/issues/WQI-404/comments",
            json!({"text": "Anyone there?", "author": "Engineer Amani"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_outage_keeps_serving_the_last_snapshot() {
    let app = TestApp::seeded().await;
    app.store.set_available(false);

    let (status, _) = app
        .send_json(Method::POST, "/issues", new_issue("Pipe burst near the school."))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert!(matches!(
        app.cache.force_refresh().await,
        RefreshOutcome::Failed(_)
    ));
    let (_, overview) = app.get("/stats/overview").await;
    assert_eq!(overview["total"], 10);

    let (status, health) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["populated"], true);
    assert_eq!(health["consecutive_failures"], 1);
}

#[tokio::test]
async fn unpopulated_cache_serves_the_seed() {
    let app = TestApp::over(MemoryIssueStore::new());
    app.store.set_available(false);

    let (_, overview) = app.get("/stats/overview").await;
    assert_eq!(overview["total"], 10);

    let (_, health) = app.get("/health").await;
    assert_eq!(health["populated"], false);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn reports_are_scoped_by_window() {
    let app = TestApp::seeded().await;

    let (status, report) = app
        .get("/reports?from=2025-03-14T00:00:00Z&to=2025-03-15T23:59:59Z")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["total"], 4);
    assert_eq!(report["resolved"], 0);
    assert_eq!(report["trend"].as_array().unwrap().len(), 2);
    assert_eq!(report["by_status"].as_array().unwrap().len(), 5);

    let (status, _) = app
        .get("/reports?from=2025-03-16T00:00:00Z&to=2025-03-14T00:00:00Z")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
