//! In-memory engine state.
//!
//! The store is the single mutable surface the synchronizer works against.
//! Embedders that persist to a database mirror these collections; the
//! synchronizer only ever reads and replaces whole rows, so the mapping is
//! mechanical.

use crate::approvals::{ApprovalState, SyncedApprovalRule};
use crate::reads::{refresh_policy_reads, PolicyProjectLink, ScanResultPolicyRead};
use crate::violations::ViolationRecord;
use approvalguard_domain::{BypassActor, MergeRequestRef, PolicyConfiguration, ProjectRef, ScanSnapshot};
use approvalguard_policy::IdAllocator;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug)]
pub struct MergeRequestState {
    pub merge_request: MergeRequestRef,
    pub approval_state: ApprovalState,
    pub approval_rules: Vec<SyncedApprovalRule>,
    /// Violation rows keyed by policy read id.
    pub violations: BTreeMap<u64, ViolationRecord>,
    /// Users who currently approve the merge request.
    pub approvals: BTreeSet<String>,
    /// Project-level setting: any diff-changing push resets approvals,
    /// independent of per-policy `remove_approvals_with_new_commit`.
    pub reset_approvals_on_push: bool,
    pub on_merge_train: bool,
    pub merged: bool,
    pub bypass_actor: Option<BypassActor>,
}

impl MergeRequestState {
    pub fn new(merge_request: MergeRequestRef) -> Self {
        Self {
            merge_request,
            approval_state: ApprovalState::Pending,
            approval_rules: Vec::new(),
            violations: BTreeMap::new(),
            approvals: BTreeSet::new(),
            reset_approvals_on_push: false,
            on_merge_train: false,
            merged: false,
            bypass_actor: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct EngineStore {
    pub configurations: Vec<PolicyConfiguration>,
    pub projects: BTreeMap<u64, ProjectRef>,
    pub reads: Vec<ScanResultPolicyRead>,
    pub links: Vec<PolicyProjectLink>,
    pub merge_requests: BTreeMap<u64, MergeRequestState>,
    pub snapshots: BTreeMap<u64, ScanSnapshot>,
    read_ids: IdAllocator,
}

impl EngineStore {
    pub fn new() -> Self {
        Self {
            read_ids: IdAllocator::starting_at(1),
            ..Self::default()
        }
    }

    pub fn add_project(&mut self, project: ProjectRef) {
        self.projects.insert(project.id, project);
    }

    pub fn add_configuration(&mut self, configuration: PolicyConfiguration) {
        self.configurations.retain(|c| c.id != configuration.id);
        self.configurations.push(configuration);
    }

    pub fn upsert_merge_request(&mut self, merge_request: MergeRequestRef) -> u64 {
        let id = merge_request.id;
        self.merge_requests
            .entry(id)
            .and_modify(|state| state.merge_request = merge_request.clone())
            .or_insert_with(|| MergeRequestState::new(merge_request));
        id
    }

    pub fn set_snapshot(&mut self, merge_request_id: u64, snapshot: ScanSnapshot) {
        self.snapshots.insert(merge_request_id, snapshot);
    }

    /// Replace the denormalized reads and links for one project from its
    /// current configuration chain.
    pub fn refresh_reads(&mut self, project_id: u64) -> usize {
        let Some(project) = self.projects.get(&project_id) else {
            return 0;
        };

        let (mut reads, links) =
            refresh_policy_reads(project, &self.configurations, &mut self.read_ids);

        // Re-syncing must not re-key surviving rows: violation rows and
        // synchronized approval rules reference reads by id. Carry ids over
        // where the (configuration, policy, rule) coordinates are unchanged.
        for read in &mut reads {
            if let Some(existing) = self.reads.iter().find(|r| {
                r.project_id == project_id
                    && r.configuration_id == read.configuration_id
                    && r.policy_index == read.policy_index
                    && r.rule_index == read.rule_index
            }) {
                read.id = existing.id;
            }
        }
        let count = reads.len();

        self.reads.retain(|r| r.project_id != project_id);
        self.links.retain(|l| l.project_id != project_id);
        self.reads.extend(reads);
        self.links.extend(links);

        count
    }

    pub fn reads_for_project(&self, project_id: u64) -> Vec<&ScanResultPolicyRead> {
        self.reads
            .iter()
            .filter(|r| r.project_id == project_id)
            .collect()
    }
}
