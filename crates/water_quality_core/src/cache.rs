//! crates/water_quality_core/src/cache.rs
//!
//! The shared, time-bounded mirror of the remote issue table.
//!
//! Reads are synchronous and never wait on the network: they return the last
//! complete snapshot (or the seed dataset before the first successful refresh)
//! and, if that snapshot is stale, kick off a background refresh. Refreshes
//! replace the snapshot wholesale by swapping one `Arc`, so a reader always sees
//! either the old or the new sequence, never a mix.

use chrono::{DateTime, Utc};
use futures::try_join;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::domain::{Comment, Issue, IssueStatus, Severity};
use crate::ports::{CommentQuery, IssueQuery, IssueStoreService, PortError, PortResult};
use crate::seed::seed_issues;
use crate::stats::{self, DailyCount, IssueFilter, RegionCount, ReportFilter, ReportSummary, TypeCount};

//=========================================================================================
// Configuration
//=========================================================================================

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum snapshot age before a read or scheduler tick refreshes it.
    pub staleness: Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Ceiling for the scheduler's delay after consecutive failures.
    pub max_backoff: Duration,
    /// Whether a stale read spawns a background refresh.
    pub refresh_on_read: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(30),
            store_timeout: Duration::from_secs(10),
            max_backoff: Duration::from_secs(300),
            refresh_on_read: true,
        }
    }
}

//=========================================================================================
// Refresh Outcome & Health
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot was younger than the staleness threshold.
    Fresh,
    /// A new snapshot with this many issues was installed.
    Refreshed { issues: usize },
    /// The store call failed or timed out; the previous snapshot was kept.
    Failed(String),
}

/// Point-in-time view of the cache for health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheHealth {
    pub populated: bool,
    pub issue_count: usize,
    pub last_refresh: Option<DateTime<Utc>>,
    pub consecutive_failures: u64,
    pub total_failures: u64,
    pub total_refreshes: u64,
}

//=========================================================================================
// The Cache
//=========================================================================================

struct Snapshot {
    issues: Option<Arc<Vec<Issue>>>,
    refreshed_at: Option<DateTime<Utc>>,
}

struct CacheInner {
    store: Arc<dyn IssueStoreService>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    snapshot: RwLock<Snapshot>,
    read_refresh_in_flight: AtomicBool,
    consecutive_failures: AtomicU64,
    total_failures: AtomicU64,
    total_refreshes: AtomicU64,
    shutdown: CancellationToken,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

/// Cheaply cloneable handle to one cache instance.
#[derive(Clone)]
pub struct IssueCache {
    inner: Arc<CacheInner>,
}

impl IssueCache {
    pub fn new(store: Arc<dyn IssueStoreService>, config: CacheConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn IssueStoreService>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                store,
                clock,
                config,
                snapshot: RwLock::new(Snapshot {
                    issues: None,
                    refreshed_at: None,
                }),
                read_refresh_in_flight: AtomicBool::new(false),
                consecutive_failures: AtomicU64::new(0),
                total_failures: AtomicU64::new(0),
                total_refreshes: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                scheduler: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.inner.clock.clone()
    }

    pub fn store(&self) -> Arc<dyn IssueStoreService> {
        self.inner.store.clone()
    }

    //=====================================================================================
    // Lifecycle
    //=====================================================================================

    /// Spawns the background keep-fresh task. Calling it twice has no effect.
    ///
    /// The task refreshes immediately, then checks staleness every `staleness`
    /// interval, backing off exponentially while the store keeps failing.
    pub fn start(&self) {
        let mut scheduler = self.inner.scheduler.lock().unwrap_or_else(|e| e.into_inner());
        if scheduler.is_some() {
            return;
        }
        let cache = self.clone();
        *scheduler = Some(tokio::spawn(async move { cache.run_scheduler().await }));
        info!(
            staleness_secs = self.inner.config.staleness.as_secs(),
            "Issue cache scheduler started."
        );
    }

    /// Stops the scheduler and waits for it to finish. In-flight one-off refreshes
    /// are left to complete on their own.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let handle = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Issue cache scheduler ended abnormally.");
            }
        }
        info!("Issue cache scheduler stopped.");
    }

    async fn run_scheduler(self) {
        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            self.maybe_refresh().await;
            delay = self.next_delay();
        }
    }

    /// `staleness * 2^failures`, capped at `max_backoff` (never below `staleness`).
    fn next_delay(&self) -> Duration {
        let config = &self.inner.config;
        let failures = self.inner.consecutive_failures.load(Ordering::SeqCst);
        if failures == 0 {
            return config.staleness;
        }
        let factor = 1u32.checked_shl(failures.min(16) as u32).unwrap_or(u32::MAX);
        config
            .staleness
            .saturating_mul(factor)
            .min(config.max_backoff.max(config.staleness))
    }

    //=====================================================================================
    // Reads
    //=====================================================================================

    /// The current snapshot, or the seed dataset if no refresh has ever succeeded.
    ///
    /// Never blocks on I/O. A stale snapshot triggers a background refresh when
    /// called inside a Tokio runtime.
    pub fn get_snapshot(&self) -> Arc<Vec<Issue>> {
        let (issues, stale) = {
            let snapshot = self.inner.snapshot.read().unwrap_or_else(|e| e.into_inner());
            (snapshot.issues.clone(), self.is_stale(snapshot.refreshed_at))
        };
        if stale && self.inner.config.refresh_on_read {
            self.spawn_read_refresh();
        }
        issues.unwrap_or_else(seed_issues)
    }

    /// Whether a refresh has ever succeeded.
    pub fn is_populated(&self) -> bool {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .issues
            .is_some()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .refreshed_at
    }

    pub fn health(&self) -> CacheHealth {
        let (populated, issue_count, last_refresh) = {
            let snapshot = self.inner.snapshot.read().unwrap_or_else(|e| e.into_inner());
            (
                snapshot.issues.is_some(),
                snapshot.issues.as_ref().map_or(0, |issues| issues.len()),
                snapshot.refreshed_at,
            )
        };
        CacheHealth {
            populated,
            issue_count,
            last_refresh,
            consecutive_failures: self.inner.consecutive_failures.load(Ordering::SeqCst),
            total_failures: self.inner.total_failures.load(Ordering::SeqCst),
            total_refreshes: self.inner.total_refreshes.load(Ordering::SeqCst),
        }
    }

    fn is_stale(&self, refreshed_at: Option<DateTime<Utc>>) -> bool {
        match refreshed_at {
            None => true,
            Some(at) => match (self.inner.clock.now() - at).to_std() {
                Ok(age) => age > self.inner.config.staleness,
                // Clock went backwards; treat as fresh.
                Err(_) => false,
            },
        }
    }

    fn spawn_read_refresh(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.inner.read_refresh_in_flight.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = self.clone();
        runtime.spawn(async move {
            cache.maybe_refresh().await;
            cache.inner.read_refresh_in_flight.store(false, Ordering::SeqCst);
        });
    }

    //=====================================================================================
    // Refreshes
    //=====================================================================================

    /// Refreshes only if the snapshot is older than the staleness threshold.
    pub async fn maybe_refresh(&self) -> RefreshOutcome {
        if !self.is_stale(self.last_refresh()) {
            return RefreshOutcome::Fresh;
        }
        self.force_refresh().await
    }

    /// Refetches unconditionally. Failures are logged and counted, never returned
    /// as errors; the previous snapshot stays in place and the refresh time is
    /// not advanced, so the next read or tick retries.
    pub async fn force_refresh(&self) -> RefreshOutcome {
        match self.fetch_all().await {
            Ok(issues) => {
                let count = issues.len();
                let now = self.inner.clock.now();
                {
                    let mut snapshot =
                        self.inner.snapshot.write().unwrap_or_else(|e| e.into_inner());
                    snapshot.issues = Some(Arc::new(issues));
                    snapshot.refreshed_at = Some(now);
                }
                self.inner.consecutive_failures.store(0, Ordering::SeqCst);
                self.inner.total_refreshes.fetch_add(1, Ordering::SeqCst);
                debug!(issues = count, "Issue cache refreshed.");
                RefreshOutcome::Refreshed { issues: count }
            }
            Err(e) => {
                let consecutive = self.inner.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                self.inner.total_failures.fetch_add(1, Ordering::SeqCst);
                warn!(
                    error = %e,
                    consecutive_failures = consecutive,
                    "Issue cache refresh failed; keeping previous snapshot."
                );
                RefreshOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fire-and-forget variant of [`force_refresh`](Self::force_refresh), used after writes.
    pub fn spawn_refresh(&self) -> JoinHandle<RefreshOutcome> {
        let cache = self.clone();
        tokio::spawn(async move { cache.force_refresh().await })
    }

    async fn fetch_all(&self) -> PortResult<Vec<Issue>> {
        let store = &self.inner.store;
        let issue_query = IssueQuery::all();
        let comment_query = CommentQuery::default();
        let (issues, comments) = try_join!(
            self.bounded(store.query_issues(&issue_query)),
            self.bounded(store.query_comments(&comment_query)),
        )?;
        Ok(attach_comments(issues, comments))
    }

    /// Runs a store call under the configured timeout.
    pub(crate) async fn bounded<T>(
        &self,
        call: impl Future<Output = PortResult<T>>,
    ) -> PortResult<T> {
        let limit = self.inner.config.store_timeout;
        tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(PortError::Unavailable(format!(
                "store call timed out after {:?}",
                limit
            )))
        })
    }

    //=====================================================================================
    // Derivations over the current snapshot
    //=====================================================================================

    pub fn find(&self, id: &str) -> Option<Issue> {
        self.get_snapshot().iter().find(|issue| issue.id == id).cloned()
    }

    pub fn count_by_status(&self) -> BTreeMap<IssueStatus, usize> {
        stats::count_by_status(&self.get_snapshot())
    }

    pub fn count_by_severity(&self) -> BTreeMap<Severity, usize> {
        stats::count_by_severity(&self.get_snapshot())
    }

    pub fn count_by_type(&self) -> Vec<TypeCount> {
        stats::count_by_type(&self.get_snapshot())
    }

    pub fn count_by_region(&self) -> Vec<RegionCount> {
        stats::count_by_region(&self.get_snapshot())
    }

    pub fn recent(&self, n: usize) -> Vec<Issue> {
        stats::recent(&self.get_snapshot(), n)
    }

    pub fn high_priority(&self) -> Vec<Issue> {
        stats::high_priority(&self.get_snapshot())
    }

    pub fn total_count(&self) -> usize {
        stats::total_count(&self.get_snapshot())
    }

    pub fn resolved_count(&self) -> usize {
        stats::resolved_count(&self.get_snapshot())
    }

    pub fn pending_count(&self) -> usize {
        stats::pending_count(&self.get_snapshot())
    }

    pub fn critical_open_count(&self) -> usize {
        stats::critical_open_count(&self.get_snapshot())
    }

    pub fn average_resolution_days(&self) -> f64 {
        stats::average_resolution_days(&self.get_snapshot())
    }

    pub fn trend_by_day(&self) -> Vec<DailyCount> {
        stats::trend_by_day(&self.get_snapshot())
    }

    pub fn unique_regions(&self) -> Vec<String> {
        stats::unique_regions(&self.get_snapshot())
    }

    pub fn filter(&self, filter: &IssueFilter) -> Vec<Issue> {
        stats::filter(&self.get_snapshot(), filter)
    }

    pub fn report(&self, scope: &ReportFilter) -> ReportSummary {
        stats::report(&self.get_snapshot(), scope)
    }
}

/// Joins comments onto their issues, keeping the store's comment order.
/// Comments whose issue is not in the fetched set are dropped.
fn attach_comments(mut issues: Vec<Issue>, comments: Vec<Comment>) -> Vec<Issue> {
    let positions: HashMap<String, usize> = issues
        .iter()
        .enumerate()
        .map(|(at, issue)| (issue.id.clone(), at))
        .collect();
    for issue in issues.iter_mut() {
        issue.comments.clear();
    }
    for comment in comments {
        match positions.get(&comment.issue_id) {
            Some(&at) => issues[at].comments.push(comment),
            None => debug!(comment_id = %comment.id, issue_id = %comment.issue_id, "Dropping orphan comment."),
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryIssueStore;
    use crate::seed::{seed_issues, SEED_IDS};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
    }

    fn quiet_config() -> CacheConfig {
        CacheConfig {
            refresh_on_read: false,
            ..CacheConfig::default()
        }
    }

    fn fixture(issues: Vec<Issue>) -> (Arc<MemoryIssueStore>, Arc<ManualClock>, IssueCache) {
        let store = Arc::new(MemoryIssueStore::with_issues(issues));
        let clock = Arc::new(ManualClock::new(start_time()));
        let cache = IssueCache::with_clock(store.clone(), clock.clone(), quiet_config());
        (store, clock, cache)
    }

    fn ids(issues: &[Issue]) -> Vec<String> {
        issues.iter().map(|issue| issue.id.clone()).collect()
    }

    #[test]
    fn unpopulated_cache_serves_seed() {
        let (_, _, cache) = fixture(Vec::new());
        let snapshot = cache.get_snapshot();
        assert!(!snapshot.is_empty());
        assert_eq!(ids(&snapshot), SEED_IDS);
        assert!(!cache.is_populated());
    }

    #[tokio::test]
    async fn refresh_replaces_seed_and_joins_comments() {
        let (_, _, cache) = fixture(seed_issues()[..2].to_vec());
        assert_eq!(cache.force_refresh().await, RefreshOutcome::Refreshed { issues: 2 });

        let snapshot = cache.get_snapshot();
        assert_eq!(ids(&snapshot), ["WQI-001", "WQI-002"]);
        assert_eq!(snapshot[0].comments.len(), 2);
        assert_eq!(snapshot[0].comments, seed_issues()[0].comments);
        assert_eq!(cache.last_refresh(), Some(start_time()));
    }

    #[tokio::test]
    async fn empty_store_yields_empty_snapshot_after_refresh() {
        let (_, _, cache) = fixture(Vec::new());
        cache.force_refresh().await;
        assert!(cache.get_snapshot().is_empty());
        assert_eq!(cache.total_count(), 0);
    }

    #[tokio::test]
    async fn maybe_refresh_respects_staleness() {
        let (store, clock, cache) = fixture(seed_issues().to_vec());
        assert!(matches!(cache.maybe_refresh().await, RefreshOutcome::Refreshed { .. }));
        assert_eq!(cache.maybe_refresh().await, RefreshOutcome::Fresh);

        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(cache.maybe_refresh().await, RefreshOutcome::Fresh);

        clock.advance(chrono::Duration::seconds(1));
        assert!(matches!(cache.maybe_refresh().await, RefreshOutcome::Refreshed { .. }));
        assert_eq!(store.issue_query_count(), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot_and_retries() {
        let (store, clock, cache) = fixture(seed_issues()[..3].to_vec());
        cache.force_refresh().await;
        let before = cache.get_snapshot();
        let refreshed_at = cache.last_refresh();

        store.set_available(false);
        clock.advance(chrono::Duration::minutes(5));
        assert!(matches!(cache.maybe_refresh().await, RefreshOutcome::Failed(_)));
        assert_eq!(cache.get_snapshot(), before);
        assert_eq!(cache.last_refresh(), refreshed_at);
        assert_eq!(cache.health().consecutive_failures, 1);

        // Refresh time was not advanced, so the next check retries immediately.
        assert!(matches!(cache.maybe_refresh().await, RefreshOutcome::Failed(_)));
        assert_eq!(cache.health().total_failures, 2);

        store.set_available(true);
        assert!(matches!(cache.maybe_refresh().await, RefreshOutcome::Refreshed { issues: 3 }));
        assert_eq!(cache.health().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn failure_before_first_refresh_still_serves_seed() {
        let (store, _, cache) = fixture(Vec::new());
        store.set_available(false);
        assert!(matches!(cache.force_refresh().await, RefreshOutcome::Failed(_)));
        assert_eq!(ids(&cache.get_snapshot()), SEED_IDS);
        assert!(!cache.health().populated);
    }

    struct HangingStore;

    #[async_trait]
    impl IssueStoreService for HangingStore {
        async fn query_issues(&self, _: &IssueQuery) -> PortResult<Vec<Issue>> {
            std::future::pending().await
        }
        async fn insert_issue(&self, issue: &Issue) -> PortResult<Issue> {
            Ok(issue.clone())
        }
        async fn update_issue(&self, id: &str, _: &crate::domain::IssueChanges) -> PortResult<Issue> {
            Err(PortError::NotFound(id.to_string()))
        }
        async fn query_comments(&self, _: &CommentQuery) -> PortResult<Vec<Comment>> {
            Ok(Vec::new())
        }
        async fn insert_comment(&self, comment: &Comment) -> PortResult<Comment> {
            Ok(comment.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_store_times_out() {
        let cache = IssueCache::new(Arc::new(HangingStore), quiet_config());
        let outcome = cache.force_refresh().await;
        assert!(matches!(outcome, RefreshOutcome::Failed(ref msg) if msg.contains("timed out")));
        assert_eq!(ids(&cache.get_snapshot()), SEED_IDS);
    }

    #[tokio::test]
    async fn stale_read_spawns_background_refresh() {
        let store = Arc::new(MemoryIssueStore::with_issues(seed_issues()[..1].to_vec()));
        let clock = Arc::new(ManualClock::new(start_time()));
        let cache = IssueCache::with_clock(store.clone(), clock, CacheConfig::default());

        // First read gets the seed immediately while the refresh runs behind it.
        assert_eq!(cache.get_snapshot().len(), SEED_IDS.len());
        for _ in 0..100 {
            if cache.is_populated() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(ids(&cache.get_snapshot()), ["WQI-001"]);
    }

    #[tokio::test]
    async fn read_without_refresh_on_read_does_not_query() {
        let (store, _, cache) = fixture(Vec::new());
        cache.get_snapshot();
        tokio::task::yield_now().await;
        assert_eq!(store.issue_query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_refreshes_until_shutdown() {
        let (store, clock, cache) = fixture(seed_issues().to_vec());
        cache.start();
        cache.start();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.is_populated());
        assert_eq!(store.issue_query_count(), 1);

        // The next tick finds the snapshot fresh by the manual clock.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.issue_query_count(), 1);

        clock.advance(chrono::Duration::seconds(31));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.issue_query_count(), 2);

        cache.shutdown().await;
        clock.advance(chrono::Duration::minutes(10));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(store.issue_query_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_backs_off_while_store_is_down() {
        let store = Arc::new(MemoryIssueStore::new());
        store.set_available(false);
        let cache = IssueCache::new(store.clone(), quiet_config());
        cache.start();

        // Attempts at t=0, 60s (30*2), 180s (+30*4), 420s (+30*8).
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.issue_query_count(), 1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.issue_query_count(), 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.issue_query_count(), 2);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.issue_query_count(), 3);

        cache.shutdown().await;
    }

    #[test]
    fn backoff_is_capped() {
        let cache = IssueCache::new(Arc::new(MemoryIssueStore::new()), quiet_config());
        assert_eq!(cache.next_delay(), Duration::from_secs(30));
        cache.inner.consecutive_failures.store(1, Ordering::SeqCst);
        assert_eq!(cache.next_delay(), Duration::from_secs(60));
        cache.inner.consecutive_failures.store(40, Ordering::SeqCst);
        assert_eq!(cache.next_delay(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn cached_derivations_are_stable_between_refreshes() {
        let (_, _, cache) = fixture(seed_issues().to_vec());
        cache.force_refresh().await;
        assert_eq!(cache.count_by_status(), cache.count_by_status());
        assert_eq!(cache.recent(5), cache.recent(5));
        assert_eq!(
            cache.count_by_status().values().sum::<usize>(),
            cache.get_snapshot().len()
        );
        assert_eq!(cache.find("WQI-004").map(|i| i.status), Some(IssueStatus::Resolved));
        assert!(cache.find("WQI-999").is_none());
    }
}
