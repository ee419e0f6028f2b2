//! Merge-request lifecycle handling and approval-rule synchronization.
//!
//! `synchronize` is recompute-and-replace: it refreshes the project's
//! policy reads, evaluates every read against the current scan snapshot,
//! replaces the violation rows, and rebuilds the synchronized approval
//! rules from scratch. Nothing is patched incrementally, so a repeated run
//! over unchanged inputs is a no-op.

use crate::approvals::{compute_approval_rules, ApprovalState, SyncedApprovalRule};
use crate::queue::{JobKind, JobScheduler};
use crate::reads::ScanResultPolicyRead;
use crate::store::{EngineStore, MergeRequestState};
use crate::violations::{ViolationTracker, ViolationsUpdate};
use anyhow::{bail, Result};
use approvalguard_domain::{
    evaluate_rule, resolve_enforcement, EnforcementReason, EvaluationContext, RuleOutcome,
};
use approvalguard_types::ViolationStatus;
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};

/// Grace period between a push and the approval reset it triggers, so that
/// code-owner rule synchronization lands first.
pub const APPROVAL_RESET_DELAY: Duration = Duration::seconds(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeRequestEvent {
    Created,
    Push { diff_changed: bool },
    TargetBranchChanged { new_target: String },
    Reopened,
    Merged,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncSummary {
    pub merge_request_id: u64,
    /// Number of policy reads evaluated this pass.
    pub evaluated: usize,
    pub violations: ViolationsUpdate,
    pub approval_rules: Vec<SyncedApprovalRule>,
    pub approval_state: ApprovalState,
    pub blocked: bool,
}

pub struct Synchronizer<'a, S: JobScheduler> {
    store: &'a mut EngineStore,
    scheduler: &'a mut S,
    now: OffsetDateTime,
}

impl<'a, S: JobScheduler> Synchronizer<'a, S> {
    pub fn new(store: &'a mut EngineStore, scheduler: &'a mut S, now: OffsetDateTime) -> Self {
        Self {
            store,
            scheduler,
            now,
        }
    }

    /// React to a merge-request lifecycle event by scheduling the follow-up
    /// work. Mutations here are limited to cheap state flips; the heavy
    /// recomputation always goes through the queue.
    pub fn handle_event(&mut self, merge_request_id: u64, event: MergeRequestEvent) -> Result<()> {
        let Some(state) = self.store.merge_requests.get_mut(&merge_request_id) else {
            bail!("unknown merge request {merge_request_id}");
        };

        match event {
            MergeRequestEvent::Created => {
                state.approval_state = ApprovalState::TemporarilyUnapproved;
                self.scheduler
                    .enqueue(JobKind::SyncMergeRequest, merge_request_id, None);
            }
            MergeRequestEvent::Push { diff_changed } => {
                if state.merged || !diff_changed {
                    return Ok(());
                }
                // Copy what we need; the reads lookup below re-borrows the
                // store immutably.
                let project_id = state.merge_request.project_id;
                let on_merge_train = state.on_merge_train;
                let reset_on_push = state.reset_approvals_on_push;
                self.scheduler
                    .enqueue(JobKind::SyncMergeRequest, merge_request_id, None);

                let wants_reset = reset_on_push
                    || self
                        .store
                        .reads_for_project(project_id)
                        .iter()
                        .any(|r| r.remove_approvals_with_new_commit());
                if wants_reset && !on_merge_train {
                    self.scheduler.enqueue(
                        JobKind::ResetApprovals,
                        merge_request_id,
                        Some(APPROVAL_RESET_DELAY),
                    );
                } else if wants_reset {
                    tracing::debug!(
                        merge_request = merge_request_id,
                        "approval reset suppressed for merge train"
                    );
                }
            }
            MergeRequestEvent::TargetBranchChanged { new_target } => {
                state.merge_request.target_branch = new_target;
                state.approval_state = ApprovalState::TemporarilyUnapproved;
                self.scheduler
                    .enqueue(JobKind::SyncMergeRequest, merge_request_id, None);
            }
            MergeRequestEvent::Reopened => {
                state.approvals.clear();
                state.approval_state = ApprovalState::TemporarilyUnapproved;
                self.scheduler
                    .enqueue(JobKind::SyncMergeRequest, merge_request_id, None);
            }
            MergeRequestEvent::Merged => {
                state.merged = true;
                tracing::info!(merge_request = merge_request_id, "merge request merged");
            }
        }

        Ok(())
    }

    /// Clear approvals after a push, unless the merge request rides a merge
    /// train or is already merged.
    pub fn reset_approvals(&mut self, merge_request_id: u64) -> Result<()> {
        let Some(state) = self.store.merge_requests.get_mut(&merge_request_id) else {
            bail!("unknown merge request {merge_request_id}");
        };
        if state.merged || state.on_merge_train {
            return Ok(());
        }

        state.approvals.clear();
        state.approval_state = derive_state(state);
        tracing::debug!(merge_request = merge_request_id, "approvals reset");
        Ok(())
    }

    /// Full recompute-and-replace pass for one merge request.
    pub fn synchronize(&mut self, merge_request_id: u64) -> Result<SyncSummary> {
        let Some(state) = self.store.merge_requests.get(&merge_request_id) else {
            bail!("unknown merge request {merge_request_id}");
        };
        if state.merged {
            return Ok(SyncSummary {
                merge_request_id,
                evaluated: 0,
                violations: ViolationsUpdate::default(),
                approval_rules: state.approval_rules.clone(),
                approval_state: state.approval_state,
                blocked: false,
            });
        }

        let merge_request = state.merge_request.clone();
        let actor = state.bypass_actor;

        self.store.refresh_reads(merge_request.project_id);
        let reads: Vec<ScanResultPolicyRead> = self
            .store
            .reads_for_project(merge_request.project_id)
            .into_iter()
            .cloned()
            .collect();
        let snapshot = self
            .store
            .snapshots
            .get(&merge_request_id)
            .cloned()
            .unwrap_or_default();

        let ctx = EvaluationContext::new(&merge_request, &snapshot, self.now);
        let mut tracker = ViolationTracker::new();
        let mut matched: Vec<(&ScanResultPolicyRead, RuleOutcome)> = Vec::new();

        for read in &reads {
            let document = read.to_policy_document();
            let evaluation = evaluate_rule(&document, &read.rule, &ctx);

            let decision = resolve_enforcement(
                evaluation.as_ref().map(|o| o.matched),
                read.fallback_behavior.fail,
                read.bypass_settings.as_ref(),
                actor.as_ref(),
                &merge_request.target_branch,
            );
            if matches!(
                decision.reason,
                EnforcementReason::BypassAccessToken
                    | EnforcementReason::BypassServiceAccount
                    | EnforcementReason::BranchException
            ) {
                tracing::debug!(
                    policy = %read.policy_name,
                    reason = ?decision.reason,
                    "policy bypassed"
                );
                tracker.skip(read);
                continue;
            }

            match evaluation {
                Ok(outcome) if outcome.matched => {
                    match &outcome.detail {
                        Some(detail) => {
                            tracker.add_violation(read, read.rule.type_name(), detail.clone())
                        }
                        None => tracker.add_violation_pending(read),
                    }
                    matched.push((read, outcome));
                }
                Ok(_) => tracker.remove_violation(read),
                Err(error) => {
                    tracing::warn!(
                        policy = %read.policy_name,
                        error = %error,
                        "rule evaluation errored"
                    );
                    tracker.add_error(read, &error);
                }
            }
        }

        let outcome_refs: Vec<(&ScanResultPolicyRead, &RuleOutcome)> =
            matched.iter().map(|(read, outcome)| (*read, outcome)).collect();
        let approval_rules = compute_approval_rules(&outcome_refs);

        let live_ids: BTreeSet<u64> = reads.iter().map(|r| r.id).collect();
        let Some(state) = self.store.merge_requests.get_mut(&merge_request_id) else {
            bail!("unknown merge request {merge_request_id}");
        };
        let mut violations = tracker.execute(&mut state.violations);
        // Rows left over from reads that no longer exist (policy deleted or
        // re-scoped away) resolve implicitly.
        state.violations.retain(|id, _| {
            let live = live_ids.contains(id);
            if !live {
                violations.resolved.push(*id);
            }
            live
        });
        state.approval_rules = approval_rules.clone();
        state.approval_state = derive_state(state);
        let blocked = state.approval_state == ApprovalState::Unapproved;

        tracing::info!(
            merge_request = merge_request_id,
            evaluated = reads.len(),
            detected = violations.detected.len(),
            resolved = violations.resolved.len(),
            blocked,
            "synchronized approval rules"
        );

        Ok(SyncSummary {
            merge_request_id,
            evaluated: reads.len(),
            violations,
            approval_rules,
            approval_state: state.approval_state,
            blocked,
        })
    }
}

/// A merge request is approved when every synchronized rule is satisfied,
/// nothing is still evaluating, and no failed row lacks an approval path.
fn derive_state(state: &MergeRequestState) -> ApprovalState {
    let approvals = state.approvals.len();
    let unsatisfied = state
        .approval_rules
        .iter()
        .any(|rule| !rule.satisfied_by(approvals));

    let covered: Vec<u64> = state
        .approval_rules
        .iter()
        .flat_map(|rule| rule.policy_read_ids.iter().copied())
        .collect();
    let hard_blocked = state.violations.values().any(|row| match row.status {
        ViolationStatus::Running => true,
        ViolationStatus::Failed => !covered.contains(&row.policy_read_id),
        ViolationStatus::Warn | ViolationStatus::Skipped => false,
    });

    if unsatisfied || hard_blocked {
        ApprovalState::Unapproved
    } else {
        ApprovalState::Approved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryScheduler;
    use approvalguard_domain::{
        BypassActor, ConfigurationSource, MergeRequestRef, PolicyConfiguration, ProjectRef,
        ScanSnapshot,
    };
    use approvalguard_test_util::{
        any_merge_request_policy, commit, merge_request, scan_finding_policy,
    };
    use approvalguard_types::{FailMode, ViolationStatus};

    fn store_with(policy: approvalguard_types::PolicyDocument) -> EngineStore {
        let mut store = EngineStore::new();
        store.add_project(ProjectRef {
            id: 1,
            ..ProjectRef::default()
        });
        store.add_configuration(PolicyConfiguration {
            id: 10,
            source: ConfigurationSource::Project { project_id: 1 },
            policies: vec![policy],
        });
        store
    }

    fn mr(id: u64) -> MergeRequestRef {
        merge_request(id, 1, "feature", "main", vec![commit("abc", true)])
    }

    #[test]
    fn created_holds_approvals_and_schedules_a_sync() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Created).unwrap();

        assert_eq!(
            store.merge_requests[&5].approval_state,
            ApprovalState::TemporarilyUnapproved
        );
        let jobs = scheduler.drain();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::SyncMergeRequest);
    }

    #[test]
    fn push_schedules_a_delayed_approval_reset() {
        let mut policy = any_merge_request_policy("block-any", 1);
        policy.approval_settings = Some(approvalguard_types::ApprovalSettings {
            remove_approvals_with_new_commit: Some(true),
            ..Default::default()
        });
        let mut store = store_with(policy);
        store.upsert_merge_request(mr(5));
        store.refresh_reads(1);
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Push { diff_changed: true })
            .unwrap();

        let jobs = scheduler.drain();
        let reset = jobs.iter().find(|j| j.kind == JobKind::ResetApprovals);
        assert_eq!(reset.map(|j| j.delay), Some(Some(APPROVAL_RESET_DELAY)));
    }

    #[test]
    fn merge_train_suppresses_the_approval_reset() {
        let mut policy = any_merge_request_policy("block-any", 1);
        policy.approval_settings = Some(approvalguard_types::ApprovalSettings {
            remove_approvals_with_new_commit: Some(true),
            ..Default::default()
        });
        let mut store = store_with(policy);
        store.upsert_merge_request(mr(5));
        store.refresh_reads(1);
        store.merge_requests.get_mut(&5).unwrap().on_merge_train = true;
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Push { diff_changed: true })
            .unwrap();

        let jobs = scheduler.drain();
        assert!(jobs.iter().all(|j| j.kind != JobKind::ResetApprovals));
        assert!(jobs.iter().any(|j| j.kind == JobKind::SyncMergeRequest));
    }

    #[test]
    fn project_level_reset_on_push_schedules_a_delayed_reset() {
        // No policy-level remove_approvals_with_new_commit here; only the
        // project setting asks for the reset.
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        store.refresh_reads(1);
        store.merge_requests.get_mut(&5).unwrap().reset_approvals_on_push = true;
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Push { diff_changed: true })
            .unwrap();

        let jobs = scheduler.drain();
        let reset = jobs.iter().find(|j| j.kind == JobKind::ResetApprovals);
        assert_eq!(reset.map(|j| j.delay), Some(Some(APPROVAL_RESET_DELAY)));
    }

    #[test]
    fn merge_train_suppresses_project_level_reset_on_push() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        store.refresh_reads(1);
        let state = store.merge_requests.get_mut(&5).unwrap();
        state.reset_approvals_on_push = true;
        state.on_merge_train = true;
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Push { diff_changed: true })
            .unwrap();

        let jobs = scheduler.drain();
        assert!(jobs.iter().all(|j| j.kind != JobKind::ResetApprovals));
        assert!(jobs.iter().any(|j| j.kind == JobKind::SyncMergeRequest));
    }

    #[test]
    fn push_without_diff_change_schedules_nothing() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.handle_event(5, MergeRequestEvent::Push { diff_changed: false })
            .unwrap();

        assert!(scheduler.drain().is_empty());
    }

    #[test]
    fn matched_rule_blocks_until_approvals_arrive() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert!(summary.blocked);
        assert_eq!(summary.approval_rules.len(), 1);
        assert_eq!(summary.approval_rules[0].approvals_required, 1);

        store
            .merge_requests
            .get_mut(&5)
            .unwrap()
            .approvals
            .insert("alice".to_string());
        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert!(!summary.blocked);
        assert_eq!(summary.approval_state, ApprovalState::Approved);
    }

    #[test]
    fn missing_scan_data_fails_closed() {
        let mut store = store_with(scan_finding_policy("block-criticals", FailMode::Closed));
        store.upsert_merge_request(mr(5));
        // No snapshot: pipeline findings have not arrived.
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert!(summary.blocked);
        let row = store.merge_requests[&5].violations.values().next().unwrap();
        assert_eq!(row.status, ViolationStatus::Failed);
    }

    #[test]
    fn missing_scan_data_warns_when_failing_open() {
        let mut store = store_with(scan_finding_policy("block-criticals", FailMode::Open));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert!(!summary.blocked);
        let row = store.merge_requests[&5].violations.values().next().unwrap();
        assert_eq!(row.status, ViolationStatus::Warn);
    }

    #[test]
    fn synchronize_is_idempotent_over_unchanged_inputs() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        store.set_snapshot(5, ScanSnapshot::default());
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let first = sync.synchronize(5).unwrap();
        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let second = sync.synchronize(5).unwrap();

        assert_eq!(first.approval_rules, second.approval_rules);
        assert_eq!(first.approval_state, second.approval_state);
        assert!(second.violations.detected.is_empty());
        assert!(second.violations.resolved.is_empty());
    }

    #[test]
    fn removing_a_policy_resolves_its_stale_violation_rows() {
        let mut store = store_with(scan_finding_policy("block-criticals", FailMode::Closed));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let first = sync.synchronize(5).unwrap();
        assert!(first.blocked);

        store.add_configuration(PolicyConfiguration {
            id: 10,
            source: ConfigurationSource::Project { project_id: 1 },
            policies: Vec::new(),
        });
        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let second = sync.synchronize(5).unwrap();

        assert!(!second.blocked);
        assert_eq!(second.violations.resolved.len(), 1);
        assert!(store.merge_requests[&5].violations.is_empty());
    }

    #[test]
    fn bypassed_policy_is_recorded_as_skipped_not_blocking() {
        let mut policy = any_merge_request_policy("block-any", 1);
        policy.bypass_settings = Some(approvalguard_types::BypassSettings {
            access_tokens: vec![42],
            ..approvalguard_types::BypassSettings::default()
        });
        let mut store = store_with(policy);
        store.upsert_merge_request(mr(5));
        store.merge_requests.get_mut(&5).unwrap().bypass_actor = Some(BypassActor {
            access_token_id: Some(42),
            service_account_id: None,
        });
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert!(!summary.blocked);
        assert!(summary.approval_rules.is_empty());
        let row = store.merge_requests[&5].violations.values().next().unwrap();
        assert_eq!(row.status, ViolationStatus::Skipped);
        assert_eq!(
            row.data.errors[0].error,
            approvalguard_types::ids::ERROR_EVALUATION_SKIPPED
        );
    }

    #[test]
    fn merged_requests_are_left_alone() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        store.merge_requests.get_mut(&5).unwrap().merged = true;
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        let summary = sync.synchronize(5).unwrap();

        assert_eq!(summary.evaluated, 0);
        assert!(!summary.blocked);
    }

    #[test]
    fn reset_approvals_clears_and_recomputes_state() {
        let mut store = store_with(any_merge_request_policy("block-any", 1));
        store.upsert_merge_request(mr(5));
        let mut scheduler = InMemoryScheduler::default();

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.synchronize(5).unwrap();
        store
            .merge_requests
            .get_mut(&5)
            .unwrap()
            .approvals
            .insert("alice".to_string());
        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.synchronize(5).unwrap();
        assert_eq!(
            store.merge_requests[&5].approval_state,
            ApprovalState::Approved
        );

        let mut sync = Synchronizer::new(&mut store, &mut scheduler, OffsetDateTime::UNIX_EPOCH);
        sync.reset_approvals(5).unwrap();

        assert!(store.merge_requests[&5].approvals.is_empty());
        assert_eq!(
            store.merge_requests[&5].approval_state,
            ApprovalState::Unapproved
        );
    }
}
