pub mod cache;
pub mod clock;
pub mod domain;
pub mod memory;
pub mod mutations;
pub mod ports;
pub mod seed;
pub mod stats;

pub use cache::{CacheConfig, CacheHealth, IssueCache, RefreshOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    Comment, Coordinates, CoordinatesError, Issue, IssueChanges, IssuePatch, IssueStatus,
    IssueType, Location, NewIssue, ParseEnumError, ResolutionChange, Severity, WaterSource,
};
pub use memory::MemoryIssueStore;
pub use mutations::{IssueService, MutationError, MutationResult, ValidationError};
pub use ports::{CommentQuery, IssueQuery, IssueStoreService, PortError, PortResult};
pub use stats::{DailyCount, IssueFilter, RegionCount, ReportFilter, ReportSummary, TypeCount};
