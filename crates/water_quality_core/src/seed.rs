//! crates/water_quality_core/src/seed.rs
//!
//! A fixed sample of issues served before the cache has ever been populated,
//! so dashboards always have something to render.

use chrono::{DateTime, Utc};
use std::sync::{Arc, OnceLock};

use crate::domain::{
    Comment, Coordinates, Issue, IssueStatus, IssueType, Location, Severity, WaterSource,
};

/// Ids of the seed issues, in snapshot order.
pub const SEED_IDS: [&str; 10] = [
    "WQI-001", "WQI-002", "WQI-003", "WQI-004", "WQI-005", "WQI-006", "WQI-007", "WQI-008",
    "WQI-009", "WQI-010",
];

/// Returns the shared seed dataset.
pub fn seed_issues() -> Arc<Vec<Issue>> {
    static SEED: OnceLock<Arc<Vec<Issue>>> = OnceLock::new();
    SEED.get_or_init(|| Arc::new(build())).clone()
}

fn at(timestamp: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_default()
}

fn place(name: &str, district: &str, lat: f64, lng: f64) -> Location {
    Location {
        name: name.to_string(),
        district: district.to_string(),
        region: "Dar es Salaam".to_string(),
        coordinates: Some(Coordinates { lat, lng }),
    }
}

fn comment(issue_id: &str, id: &str, text: &str, created_at: &str, created_by: &str) -> Comment {
    Comment {
        id: format!("{}-{}", issue_id, id),
        issue_id: issue_id.to_string(),
        text: text.to_string(),
        created_at: at(created_at),
        created_by: created_by.to_string(),
    }
}

fn photo(id: u32) -> String {
    format!(
        "https://images.pexels.com/photos/{id}/pexels-photo-{id}.jpeg?auto=compress&cs=tinysrgb&w=1260&h=750&dpr=1"
    )
}

struct SeedRow {
    id: &'static str,
    location: Location,
    reported_by: &'static str,
    reported_at: &'static str,
    description: &'static str,
    water_source: WaterSource,
    issue_type: IssueType,
    severity: Severity,
    status: IssueStatus,
    assigned_to: Option<&'static str>,
    updated_at: Option<&'static str>,
    resolved_at: Option<&'static str>,
    images: Vec<String>,
    comments: Vec<(&'static str, &'static str, &'static str)>,
}

impl SeedRow {
    fn into_issue(self) -> Issue {
        let reported_at = at(self.reported_at);
        let assignee = self.assigned_to.unwrap_or("Unassigned");
        let comments = self
            .comments
            .into_iter()
            .map(|(id, text, created_at)| comment(self.id, id, text, created_at, assignee))
            .collect();
        Issue {
            id: self.id.to_string(),
            location: self.location,
            reported_by: self.reported_by.to_string(),
            reported_at,
            description: self.description.to_string(),
            water_source: self.water_source,
            issue_type: self.issue_type,
            severity: self.severity,
            status: self.status,
            assigned_to: self.assigned_to.map(str::to_string),
            updated_at: self.updated_at.map(at).unwrap_or(reported_at),
            resolved_at: self.resolved_at.map(at),
            images: self.images,
            comments,
        }
    }
}

fn build() -> Vec<Issue> {
    let rows = vec![
        SeedRow {
            id: "WQI-001",
            location: place("Msasani Peninsula", "Kinondoni", -6.7611, 39.2486),
            reported_by: "Maria Kimaro",
            reported_at: "2025-03-15T09:30:00Z",
            description: "Tap water has a strong chemical smell and brownish color. Multiple households affected.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Contamination,
            severity: Severity::High,
            status: IssueStatus::InProgress,
            assigned_to: Some("Engineer Juma"),
            updated_at: Some("2025-03-17T11:45:00Z"),
            resolved_at: None,
            images: vec![photo(2253610)],
            comments: vec![
                ("c1", "Initial assessment shows potential contamination from rusted pipes. Need to test water samples.", "2025-03-16T10:20:00Z"),
                ("c2", "Water samples collected and sent to the lab for testing.", "2025-03-17T11:45:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-002",
            location: place("Tandale", "Kinondoni", -6.7928, 39.2486),
            reported_by: "Ibrahim Hassan",
            reported_at: "2025-03-14T15:20:00Z",
            description: "Community borehole has stopped working. Over 200 households affected.",
            water_source: WaterSource::Borehole,
            issue_type: IssueType::Infrastructure,
            severity: Severity::Critical,
            status: IssueStatus::Investigating,
            assigned_to: Some("Engineer Baraka"),
            updated_at: Some("2025-03-15T09:10:00Z"),
            resolved_at: None,
            images: vec![photo(2537480)],
            comments: vec![
                ("c1", "Initial inspection scheduled for tomorrow morning.", "2025-03-14T16:45:00Z"),
                ("c2", "Inspection completed. The pump motor has failed and needs replacement. Ordering parts.", "2025-03-15T09:10:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-003",
            location: place("Kipawa", "Ilala", -6.8314, 39.2047),
            reported_by: "Sarah Mwakasege",
            reported_at: "2025-03-12T11:15:00Z",
            description: "Water has strong chlorine smell and taste. Affecting entire neighborhood.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Taste,
            severity: Severity::Medium,
            status: IssueStatus::Resolved,
            assigned_to: Some("Engineer Zawadi"),
            updated_at: Some("2025-03-13T14:30:00Z"),
            resolved_at: Some("2025-03-13T14:30:00Z"),
            images: vec![photo(1866149)],
            comments: vec![
                ("c1", "Investigation shows recent maintenance led to over-chlorination. Adjustments made to treatment facility.", "2025-03-13T14:30:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-004",
            location: place("Mwenge", "Kinondoni", -6.7731, 39.2486),
            reported_by: "John Mbwambo",
            reported_at: "2025-03-10T08:45:00Z",
            description: "No water supply for 3 days. Entire area affected.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Shortage,
            severity: Severity::High,
            status: IssueStatus::Resolved,
            assigned_to: Some("Engineer Ramadhani"),
            updated_at: Some("2025-03-11T16:20:00Z"),
            resolved_at: Some("2025-03-11T16:20:00Z"),
            images: Vec::new(),
            comments: vec![
                ("c1", "Main supply line damaged during road construction. Temporary repairs completed.", "2025-03-11T10:30:00Z"),
                ("c2", "Permanent repairs completed. Water supply restored.", "2025-03-11T16:20:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-005",
            location: place("Mbezi Beach", "Kinondoni", -6.7389, 39.2184),
            reported_by: "Grace Makundi",
            reported_at: "2025-03-16T17:30:00Z",
            description: "Water appears cloudy with sediment. Multiple households reporting issues.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Color,
            severity: Severity::Medium,
            status: IssueStatus::Pending,
            assigned_to: None,
            updated_at: None,
            resolved_at: None,
            images: vec![photo(4252526)],
            comments: Vec::new(),
        },
        SeedRow {
            id: "WQI-006",
            location: place("Mabibo", "Ubungo", -6.8125, 39.2184),
            reported_by: "David Swai",
            reported_at: "2025-03-17T10:10:00Z",
            description: "Community well water has unusual odor. People experiencing stomach issues after consumption.",
            water_source: WaterSource::Well,
            issue_type: IssueType::Odor,
            severity: Severity::Critical,
            status: IssueStatus::Investigating,
            assigned_to: Some("Engineer Salim"),
            updated_at: Some("2025-03-17T13:40:00Z"),
            resolved_at: None,
            images: vec![photo(5599562)],
            comments: vec![
                ("c1", "Initial investigation scheduled. Advising residents to avoid consumption until further notice.", "2025-03-17T13:40:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-007",
            location: place("Manzese", "Ubungo", -6.7928, 39.2371),
            reported_by: "Fatima Mwinyi",
            reported_at: "2025-03-13T14:50:00Z",
            description: "Water pressure very low in the entire neighborhood for over a week.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Infrastructure,
            severity: Severity::Medium,
            status: IssueStatus::InProgress,
            assigned_to: Some("Engineer Joseph"),
            updated_at: Some("2025-03-15T11:30:00Z"),
            resolved_at: None,
            images: Vec::new(),
            comments: vec![
                ("c1", "Initial assessment shows potential blockage in main distribution pipe. Scheduling maintenance.", "2025-03-14T09:15:00Z"),
                ("c2", "Maintenance team deployed. Working on clearing blockage.", "2025-03-15T11:30:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-008",
            location: place("Magomeni", "Kinondoni", -6.8011, 39.2602),
            reported_by: "Peter Makamba",
            reported_at: "2025-03-16T12:20:00Z",
            description: "River water appears to have oil contamination. Local fishermen reporting dead fish.",
            water_source: WaterSource::River,
            issue_type: IssueType::Contamination,
            severity: Severity::Critical,
            status: IssueStatus::Investigating,
            assigned_to: Some("Engineer Rose"),
            updated_at: Some("2025-03-17T08:45:00Z"),
            resolved_at: None,
            images: vec![photo(4209318)],
            comments: vec![
                ("c1", "Environmental team dispatched to investigate source of contamination. Samples collected.", "2025-03-17T08:45:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-009",
            location: place("Kigamboni", "Kigamboni", -6.8236, 39.2953),
            reported_by: "Benjamin Urassa",
            reported_at: "2025-03-15T16:40:00Z",
            description: "Community water tank damaged and leaking. Serves about 50 households.",
            water_source: WaterSource::Other,
            issue_type: IssueType::Infrastructure,
            severity: Severity::High,
            status: IssueStatus::InProgress,
            assigned_to: Some("Engineer Amina"),
            updated_at: Some("2025-03-16T10:15:00Z"),
            resolved_at: None,
            images: vec![photo(11042732)],
            comments: vec![
                ("c1", "Assessment complete. Tank needs replacement. Temporary water distribution arranged.", "2025-03-16T10:15:00Z"),
            ],
        },
        SeedRow {
            id: "WQI-010",
            location: place("Tabata", "Ilala", -6.8452, 39.2268),
            reported_by: "Lucy Mwaikambo",
            reported_at: "2025-03-14T09:25:00Z",
            description: "Tap water has metallic taste and reddish color.",
            water_source: WaterSource::Tap,
            issue_type: IssueType::Taste,
            severity: Severity::Medium,
            status: IssueStatus::Rejected,
            assigned_to: Some("Engineer Thomas"),
            updated_at: Some("2025-03-14T14:50:00Z"),
            resolved_at: None,
            images: vec![photo(3698534)],
            comments: vec![
                ("c1", "Investigation shows issue is isolated to reporter's home plumbing. Not a system-wide issue.", "2025-03-14T14:50:00Z"),
            ],
        },
    ];

    rows.into_iter().map(SeedRow::into_issue).collect()
}
