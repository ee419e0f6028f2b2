//! Approval-rule synchronization for merge requests.
//!
//! This crate owns the mutable side of the engine: denormalized policy
//! reads, per-merge-request violations, synchronized approval rules, and
//! the lifecycle events that trigger recomputation. Everything is
//! recompute-and-replace — running the synchronizer twice over unchanged
//! inputs yields an unchanged approval-rule set.

#![forbid(unsafe_code)]

pub mod approvals;
pub mod queue;
pub mod reads;
pub mod store;
pub mod synchronizer;
pub mod violations;

pub use approvals::{compute_approval_rules, ApprovalState, SyncedApprovalRule};
pub use queue::{InMemoryScheduler, JobKind, JobScheduler, ScheduledJob};
pub use reads::{refresh_policy_reads, PolicyProjectLink, ScanResultPolicyRead};
pub use store::{EngineStore, MergeRequestState};
pub use synchronizer::{MergeRequestEvent, SyncSummary, Synchronizer, APPROVAL_RESET_DELAY};
pub use violations::{ViolationRecord, ViolationTracker, ViolationsUpdate};
