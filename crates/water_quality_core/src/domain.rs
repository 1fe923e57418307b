//! crates/water_quality_core/src/domain.rs
//!
//! Defines the core data structures for water quality issue tracking.
//! These structs carry serde derives for the wire layer but know nothing about
//! the database or the HTTP framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

//=========================================================================================
// Classification Enums
//=========================================================================================

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Generates the canonical string form, `FromStr`, `Display` and the `ALL`
/// list for a snake_case classification enum.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in display order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterSource {
    Tap,
    Well,
    River,
    Lake,
    Borehole,
    Other,
}

string_enum!(WaterSource, "water source", {
    Tap => "tap",
    Well => "well",
    River => "river",
    Lake => "lake",
    Borehole => "borehole",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Contamination,
    Shortage,
    Infrastructure,
    Taste,
    Color,
    Odor,
    Other,
}

string_enum!(IssueType, "issue type", {
    Contamination => "contamination",
    Shortage => "shortage",
    Infrastructure => "infrastructure",
    Taste => "taste",
    Color => "color",
    Odor => "odor",
    Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

string_enum!(Severity, "severity", {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

impl Severity {
    /// High and critical issues feed the dashboard's priority list.
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// Lifecycle status of an issue. Any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    Pending,
    Investigating,
    InProgress,
    Resolved,
    Rejected,
}

string_enum!(IssueStatus, "status", {
    Pending => "pending",
    Investigating => "investigating",
    InProgress => "in_progress",
    Resolved => "resolved",
    Rejected => "rejected",
});

impl IssueStatus {
    /// Resolved and rejected issues need no further work.
    pub fn is_closed(&self) -> bool {
        matches!(self, IssueStatus::Resolved | IssueStatus::Rejected)
    }
}

//=========================================================================================
// Location
//=========================================================================================

/// A latitude/longitude pair. Both halves are always present together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatesError {
    #[error("latitude and longitude must be given together")]
    Incomplete,
    #[error("coordinates ({lat}, {lng}) are out of range")]
    OutOfRange { lat: String, lng: String },
}

impl Coordinates {
    /// Builds coordinates from the flattened, individually optional columns.
    ///
    /// Both absent yields `Ok(None)`; exactly one present is rejected.
    pub fn from_parts(lat: Option<f64>, lng: Option<f64>) -> Result<Option<Self>, CoordinatesError> {
        match (lat, lng) {
            (None, None) => Ok(None),
            (Some(lat), Some(lng)) => {
                let in_range = lat.is_finite()
                    && lng.is_finite()
                    && (-90.0..=90.0).contains(&lat)
                    && (-180.0..=180.0).contains(&lng);
                if !in_range {
                    return Err(CoordinatesError::OutOfRange {
                        lat: lat.to_string(),
                        lng: lng.to_string(),
                    });
                }
                Ok(Some(Self { lat, lng }))
            }
            _ => Err(CoordinatesError::Incomplete),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub district: String,
    pub region: String,
    pub coordinates: Option<Coordinates>,
}

//=========================================================================================
// Issue & Comment
//=========================================================================================

/// A single note attached to an issue. Comments are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// A reported water quality problem.
///
/// `resolved_at` is set exactly when `status` is [`IssueStatus::Resolved`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub location: Location,
    pub reported_by: String,
    pub reported_at: DateTime<Utc>,
    pub description: String,
    pub water_source: WaterSource,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub status: IssueStatus,
    pub assigned_to: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub comments: Vec<Comment>,
}

impl Issue {
    /// Whether this issue still needs attention on the priority list.
    pub fn is_high_priority(&self) -> bool {
        self.severity.is_high_priority() && !self.status.is_closed()
    }

    /// Time from report to resolution, if the issue is resolved.
    pub fn resolution_time(&self) -> Option<chrono::Duration> {
        match (self.status, self.resolved_at) {
            (IssueStatus::Resolved, Some(resolved_at)) => Some(resolved_at - self.reported_at),
            _ => None,
        }
    }
}

//=========================================================================================
// Write Payloads
//=========================================================================================

/// The fields a caller supplies to report a new issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewIssue {
    pub location: Location,
    pub reported_by: String,
    /// Defaults to the current time when absent.
    pub reported_at: Option<DateTime<Utc>>,
    pub description: String,
    pub water_source: WaterSource,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub images: Vec<String>,
}

/// A partial update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuePatch {
    pub location: Option<Location>,
    pub description: Option<String>,
    pub water_source: Option<WaterSource>,
    pub issue_type: Option<IssueType>,
    pub severity: Option<Severity>,
    pub status: Option<IssueStatus>,
    /// `Some(None)` unassigns the issue.
    pub assigned_to: Option<Option<String>>,
    pub images: Option<Vec<String>>,
}

/// How an update moves the `resolved_at` column.
///
/// Stores evaluate it against the row they are writing, inside the same write,
/// so the stamp agrees with the status even when updates race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResolutionChange {
    #[default]
    Unchanged,
    /// Stamp `at`, unless the row is already resolved and stamped.
    Resolve(DateTime<Utc>),
    Clear,
}

impl ResolutionChange {
    /// The change implied by a patched status.
    pub fn for_status(next: Option<IssueStatus>, now: DateTime<Utc>) -> Self {
        match next {
            Some(IssueStatus::Resolved) => ResolutionChange::Resolve(now),
            Some(_) => ResolutionChange::Clear,
            None => ResolutionChange::Unchanged,
        }
    }

    /// The new `resolved_at` for a row currently in `status` with stamp `current`.
    pub fn apply(
        &self,
        status: IssueStatus,
        current: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match self {
            ResolutionChange::Unchanged => current,
            ResolutionChange::Resolve(at) if status == IssueStatus::Resolved => current.or(Some(*at)),
            ResolutionChange::Resolve(at) => Some(*at),
            ResolutionChange::Clear => None,
        }
    }
}

/// The column changes actually written to the store for one update.
///
/// Built from an [`IssuePatch`] plus the timestamps the core derives.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueChanges {
    pub patch: IssuePatch,
    pub updated_at: DateTime<Utc>,
    pub resolution: ResolutionChange,
}

impl IssueChanges {
    /// Applies these changes to an issue in place.
    pub fn apply_to(&self, issue: &mut Issue) {
        let patch = &self.patch;
        issue.resolved_at = self.resolution.apply(issue.status, issue.resolved_at);
        if let Some(location) = &patch.location {
            issue.location = location.clone();
        }
        if let Some(description) = &patch.description {
            issue.description = description.clone();
        }
        if let Some(water_source) = patch.water_source {
            issue.water_source = water_source;
        }
        if let Some(issue_type) = patch.issue_type {
            issue.issue_type = issue_type;
        }
        if let Some(severity) = patch.severity {
            issue.severity = severity;
        }
        if let Some(status) = patch.status {
            issue.status = status;
        }
        if let Some(assigned_to) = &patch.assigned_to {
            issue.assigned_to = assigned_to.clone();
        }
        if let Some(images) = &patch.images {
            issue.images = images.clone();
        }
        issue.updated_at = self.updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_strings_round_trip_through_from_str() {
        for status in IssueStatus::ALL {
            assert_eq!(status.as_str().parse::<IssueStatus>(), Ok(*status));
        }
        assert_eq!(IssueStatus::InProgress.as_str(), "in_progress");
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let err = "boiling".parse::<Severity>().unwrap_err();
        assert_eq!(err.kind, "severity");
        assert_eq!(err.value, "boiling");
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&IssueStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        let parsed: WaterSource = serde_json::from_str("\"borehole\"").unwrap();
        assert_eq!(parsed, WaterSource::Borehole);
    }

    #[test]
    fn coordinates_require_both_halves() {
        assert_eq!(Coordinates::from_parts(None, None), Ok(None));
        assert_eq!(
            Coordinates::from_parts(Some(-6.76), None),
            Err(CoordinatesError::Incomplete)
        );
        assert_eq!(
            Coordinates::from_parts(None, Some(39.2)),
            Err(CoordinatesError::Incomplete)
        );
        assert_eq!(
            Coordinates::from_parts(Some(-6.76), Some(39.25)),
            Ok(Some(Coordinates { lat: -6.76, lng: 39.25 }))
        );
    }

    #[test]
    fn coordinates_reject_out_of_range_values() {
        assert!(matches!(
            Coordinates::from_parts(Some(91.0), Some(0.0)),
            Err(CoordinatesError::OutOfRange { .. })
        ));
        assert!(matches!(
            Coordinates::from_parts(Some(f64::NAN), Some(0.0)),
            Err(CoordinatesError::OutOfRange { .. })
        ));
    }

    #[test]
    fn resolution_change_is_decided_against_the_written_row() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap();
        let earlier = now - chrono::Duration::days(2);
        let resolve = ResolutionChange::for_status(Some(IssueStatus::Resolved), now);

        assert_eq!(resolve.apply(IssueStatus::Pending, None), Some(now));
        assert_eq!(resolve.apply(IssueStatus::Resolved, Some(earlier)), Some(earlier));
        assert_eq!(resolve.apply(IssueStatus::Resolved, None), Some(now));
        // A row reopened since the caller looked still gets a fresh stamp.
        assert_eq!(resolve.apply(IssueStatus::Investigating, Some(earlier)), Some(now));

        let reopen = ResolutionChange::for_status(Some(IssueStatus::Pending), now);
        assert_eq!(reopen.apply(IssueStatus::Resolved, Some(earlier)), None);
        assert_eq!(
            ResolutionChange::for_status(None, now).apply(IssueStatus::Resolved, Some(earlier)),
            Some(earlier)
        );
    }

    #[test]
    fn closed_statuses() {
        assert!(IssueStatus::Resolved.is_closed());
        assert!(IssueStatus::Rejected.is_closed());
        assert!(!IssueStatus::InProgress.is_closed());
    }
}
