//! crates/water_quality_core/src/stats.rs
//!
//! Pure derivations over a slice of issues: chart series, headline counts and
//! the report summary. Nothing here caches or suspends; every call recomputes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::{Issue, IssueStatus, IssueType, Severity};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

//=========================================================================================
// Series Types
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub issue_type: IssueType,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionCount {
    pub region: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

//=========================================================================================
// Grouped Counts
//=========================================================================================

/// Counts per status. Every status is present, zero included.
pub fn count_by_status(issues: &[Issue]) -> BTreeMap<IssueStatus, usize> {
    let mut counts: BTreeMap<IssueStatus, usize> =
        IssueStatus::ALL.iter().map(|status| (*status, 0)).collect();
    for issue in issues {
        *counts.entry(issue.status).or_default() += 1;
    }
    counts
}

/// Counts per severity. Every severity is present, zero included.
pub fn count_by_severity(issues: &[Issue]) -> BTreeMap<Severity, usize> {
    let mut counts: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|severity| (*severity, 0)).collect();
    for issue in issues {
        *counts.entry(issue.severity).or_default() += 1;
    }
    counts
}

/// Counts per issue type, only for types present, in first-seen order.
pub fn count_by_type(issues: &[Issue]) -> Vec<TypeCount> {
    first_seen_counts(issues.iter().map(|issue| issue.issue_type))
        .into_iter()
        .map(|(issue_type, count)| TypeCount { issue_type, count })
        .collect()
}

/// Counts per region, only for regions present, in first-seen order.
pub fn count_by_region(issues: &[Issue]) -> Vec<RegionCount> {
    first_seen_counts(issues.iter().map(|issue| issue.location.region.as_str()))
        .into_iter()
        .map(|(region, count)| RegionCount {
            region: region.to_string(),
            count,
        })
        .collect()
}

fn first_seen_counts<K>(keys: impl Iterator<Item = K>) -> Vec<(K, usize)>
where
    K: Eq + std::hash::Hash + Copy,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut counts: Vec<(K, usize)> = Vec::new();
    for key in keys {
        match positions.get(&key) {
            Some(&at) => counts[at].1 += 1,
            None => {
                positions.insert(key, counts.len());
                counts.push((key, 1));
            }
        }
    }
    counts
}

/// Issues reported per UTC calendar day, ascending by date. Days without reports are omitted.
pub fn trend_by_day(issues: &[Issue]) -> Vec<DailyCount> {
    let mut days: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for issue in issues {
        *days.entry(issue.reported_at.date_naive()).or_default() += 1;
    }
    days.into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

//=========================================================================================
// Selections
//=========================================================================================

/// The `n` most recently reported issues. Ties keep their snapshot order.
pub fn recent(issues: &[Issue], n: usize) -> Vec<Issue> {
    let mut sorted: Vec<&Issue> = issues.iter().collect();
    sorted.sort_by(|a, b| b.reported_at.cmp(&a.reported_at));
    sorted.into_iter().take(n).cloned().collect()
}

/// High or critical issues that are neither resolved nor rejected, in snapshot order.
pub fn high_priority(issues: &[Issue]) -> Vec<Issue> {
    issues
        .iter()
        .filter(|issue| issue.is_high_priority())
        .cloned()
        .collect()
}

/// Distinct regions, sorted.
pub fn unique_regions(issues: &[Issue]) -> Vec<String> {
    let mut regions: Vec<String> = issues
        .iter()
        .map(|issue| issue.location.region.clone())
        .collect();
    regions.sort();
    regions.dedup();
    regions
}

//=========================================================================================
// Headline Numbers
//=========================================================================================

pub fn total_count(issues: &[Issue]) -> usize {
    issues.len()
}

pub fn resolved_count(issues: &[Issue]) -> usize {
    count_where(issues, |issue| issue.status == IssueStatus::Resolved)
}

pub fn pending_count(issues: &[Issue]) -> usize {
    count_where(issues, |issue| issue.status == IssueStatus::Pending)
}

/// Critical issues not yet resolved. Rejected ones still count.
pub fn critical_open_count(issues: &[Issue]) -> usize {
    count_where(issues, |issue| {
        issue.severity == Severity::Critical && issue.status != IssueStatus::Resolved
    })
}

fn count_where(issues: &[Issue], predicate: impl Fn(&Issue) -> bool) -> usize {
    issues.iter().filter(|issue| predicate(issue)).count()
}

/// Mean wall-clock time from report to resolution, in fractional days.
///
/// Returns `0.0` when no resolved issue carries a resolution timestamp.
pub fn average_resolution_days(issues: &[Issue]) -> f64 {
    let durations: Vec<i64> = issues
        .iter()
        .filter_map(Issue::resolution_time)
        .map(|elapsed| elapsed.num_milliseconds())
        .collect();
    if durations.is_empty() {
        return 0.0;
    }
    let total: f64 = durations.iter().map(|ms| *ms as f64).sum();
    total / durations.len() as f64 / MILLIS_PER_DAY
}

//=========================================================================================
// Filters & Reports
//=========================================================================================

/// The issue list's search box and drop-downs. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueFilter {
    /// Case-insensitive substring over location name, description and reporter.
    pub search: Option<String>,
    pub status: Option<IssueStatus>,
    pub severity: Option<Severity>,
    pub region: Option<String>,
}

impl IssueFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        let search_hit = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                [
                    issue.location.name.as_str(),
                    issue.description.as_str(),
                    issue.reported_by.as_str(),
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&term))
            }
        };
        search_hit
            && self.status.map_or(true, |status| issue.status == status)
            && self.severity.map_or(true, |severity| issue.severity == severity)
            && self
                .region
                .as_deref()
                .map_or(true, |region| issue.location.region == region)
    }
}

/// Issues matching the filter, in snapshot order.
pub fn filter(issues: &[Issue], filter: &IssueFilter) -> Vec<Issue> {
    issues
        .iter()
        .filter(|issue| filter.matches(issue))
        .cloned()
        .collect()
}

/// Scope of a report: an inclusive reporting window plus region and status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub region: Option<String>,
    pub status: Option<IssueStatus>,
}

impl ReportFilter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.from.map_or(true, |from| issue.reported_at >= from)
            && self.to.map_or(true, |to| issue.reported_at <= to)
            && self
                .region
                .as_deref()
                .map_or(true, |region| issue.location.region == region)
            && self.status.map_or(true, |status| issue.status == status)
    }
}

/// Everything the reports page shows for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub by_status: BTreeMap<IssueStatus, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_type: Vec<TypeCount>,
    pub by_region: Vec<RegionCount>,
    pub trend: Vec<DailyCount>,
    pub total: usize,
    pub resolved: usize,
    pub pending: usize,
    pub average_resolution_days: f64,
}

pub fn report(issues: &[Issue], scope: &ReportFilter) -> ReportSummary {
    let scoped: Vec<Issue> = issues
        .iter()
        .filter(|issue| scope.matches(issue))
        .cloned()
        .collect();
    ReportSummary {
        by_status: count_by_status(&scoped),
        by_severity: count_by_severity(&scoped),
        by_type: count_by_type(&scoped),
        by_region: count_by_region(&scoped),
        trend: trend_by_day(&scoped),
        total: total_count(&scoped),
        resolved: resolved_count(&scoped),
        pending: pending_count(&scoped),
        average_resolution_days: average_resolution_days(&scoped),
    }
}
