//! Background-job seam.
//!
//! The engine never runs its own worker loop; it hands (kind, argument id,
//! optional delay) triples to whatever queue the host system provides.
//! Jobs must be idempotent — the synchronizer recomputes from scratch, so
//! duplicate deliveries converge.

use time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Re-synchronize one merge request's approval rules.
    SyncMergeRequest,
    /// Reset approvals on one merge request after a push.
    ResetApprovals,
    /// Refresh denormalized policy reads for one project.
    RefreshPolicyReads,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledJob {
    pub kind: JobKind,
    pub argument_id: u64,
    pub delay: Option<Duration>,
}

pub trait JobScheduler {
    fn enqueue(&mut self, kind: JobKind, argument_id: u64, delay: Option<Duration>);
}

/// Records jobs instead of running them. Tests drain it; embedders bridge
/// it to a real queue.
#[derive(Clone, Debug, Default)]
pub struct InMemoryScheduler {
    pub jobs: Vec<ScheduledJob>,
}

impl InMemoryScheduler {
    pub fn drain(&mut self) -> Vec<ScheduledJob> {
        std::mem::take(&mut self.jobs)
    }
}

impl JobScheduler for InMemoryScheduler {
    fn enqueue(&mut self, kind: JobKind, argument_id: u64, delay: Option<Duration>) {
        self.jobs.push(ScheduledJob {
            kind,
            argument_id,
            delay,
        });
    }
}
