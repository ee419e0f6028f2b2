//! Per-merge-request violation rows.
//!
//! The tracker accumulates one evaluation pass worth of violated and
//! unviolated policy reads, then `execute` reconciles them against the
//! stored rows. Rows are replaced wholesale on every pass, so re-running
//! an unchanged evaluation leaves the rows unchanged.

use crate::reads::ScanResultPolicyRead;
use approvalguard_domain::EvaluationError;
use approvalguard_types::{ids, FailMode, ViolationData, ViolationError, ViolationStatus};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

/// One stored violation row, keyed by policy read id.
#[derive(Clone, Debug, PartialEq)]
pub struct ViolationRecord {
    pub policy_read_id: u64,
    pub policy_name: String,
    pub status: ViolationStatus,
    pub data: ViolationData,
}

impl ViolationRecord {
    /// Whether this row blocks merging. Running rows block like failures;
    /// the rule has simply not finished evaluating.
    pub fn blocks_merge(&self) -> bool {
        matches!(self.status, ViolationStatus::Running | ViolationStatus::Failed)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViolationsUpdate {
    /// Read ids whose rows were created or replaced this pass.
    pub detected: Vec<u64>,
    /// Read ids whose rows were removed this pass.
    pub resolved: Vec<u64>,
}

#[derive(Clone, Debug)]
struct PendingViolation {
    policy_name: String,
    fail_mode: FailMode,
    skipped: bool,
    data: ViolationData,
}

/// Accumulates one evaluation pass. `execute` applies it and resets the
/// tracker for the next pass.
#[derive(Clone, Debug, Default)]
pub struct ViolationTracker {
    violated: BTreeMap<u64, PendingViolation>,
    unviolated: BTreeSet<u64>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, read: &ScanResultPolicyRead) -> &mut PendingViolation {
        self.unviolated.remove(&read.id);
        self.violated
            .entry(read.id)
            .or_insert_with(|| PendingViolation {
                policy_name: read.policy_name.clone(),
                fail_mode: read.fallback_behavior.fail,
                skipped: false,
                data: ViolationData::default(),
            })
    }

    /// Mark the read as violated without detail yet. The resulting row is
    /// `running` until data or errors arrive.
    pub fn add_violation_pending(&mut self, read: &ScanResultPolicyRead) {
        self.entry(read);
    }

    pub fn add_violation(&mut self, read: &ScanResultPolicyRead, rule_type: &str, data: JsonValue) {
        self.entry(read).data.merge_rule_data(rule_type, data);
    }

    pub fn add_error(&mut self, read: &ScanResultPolicyRead, error: &EvaluationError) {
        let violation_error = violation_error_for(error);
        self.entry(read).data.add_error(violation_error);
    }

    /// Record a deliberate skip. Skips do not count as hard errors.
    pub fn skip(&mut self, read: &ScanResultPolicyRead) {
        let entry = self.entry(read);
        entry.skipped = true;
        entry
            .data
            .add_error(ViolationError::new(ids::ERROR_EVALUATION_SKIPPED));
    }

    pub fn remove_violation(&mut self, read: &ScanResultPolicyRead) {
        if !self.violated.contains_key(&read.id) {
            self.unviolated.insert(read.id);
        }
    }

    /// Apply the accumulated pass to `rows`, replacing violated rows and
    /// deleting unviolated ones.
    pub fn execute(&mut self, rows: &mut BTreeMap<u64, ViolationRecord>) -> ViolationsUpdate {
        let mut update = ViolationsUpdate::default();

        for id in std::mem::take(&mut self.unviolated) {
            if rows.remove(&id).is_some() {
                update.resolved.push(id);
            }
        }

        for (id, pending) in std::mem::take(&mut self.violated) {
            let record = ViolationRecord {
                policy_read_id: id,
                policy_name: pending.policy_name.clone(),
                status: pending.status(),
                data: pending.data,
            };
            if rows.get(&id) != Some(&record) {
                update.detected.push(id);
            }
            rows.insert(id, record);
        }

        update
    }
}

impl PendingViolation {
    fn status(&self) -> ViolationStatus {
        if !self.data.violations.is_empty() {
            // Real violations stay failed even under fail-open; the
            // fallback only softens evaluation *errors*.
            ViolationStatus::Failed
        } else if self.data.has_hard_errors() {
            match self.fail_mode {
                FailMode::Open => ViolationStatus::Warn,
                FailMode::Closed => ViolationStatus::Failed,
            }
        } else if self.skipped {
            match self.fail_mode {
                FailMode::Open => ViolationStatus::Warn,
                FailMode::Closed => ViolationStatus::Skipped,
            }
        } else {
            ViolationStatus::Running
        }
    }
}

fn violation_error_for(error: &EvaluationError) -> ViolationError {
    match error {
        EvaluationError::ScannerRemoved { missing_scans } => {
            let mut extra = serde_json::Map::new();
            extra.insert(
                "missing_scans".to_string(),
                JsonValue::from(missing_scans.clone()),
            );
            ViolationError::with_extra(error.code(), extra)
        }
        EvaluationError::RuleContentInvalid(detail) => {
            let mut extra = serde_json::Map::new();
            extra.insert("detail".to_string(), JsonValue::from(detail.clone()));
            ViolationError::with_extra(error.code(), extra)
        }
        EvaluationError::FindingsPending | EvaluationError::Timeout => {
            ViolationError::new(error.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvalguard_types::{
        FallbackBehavior, PolicyType, RuleSchema, ScanFindingRule,
    };
    use serde_json::json;

    fn read(id: u64, fail: FailMode) -> ScanResultPolicyRead {
        ScanResultPolicyRead {
            id,
            configuration_id: 1,
            project_id: 1,
            policy_index: 0,
            rule_index: 0,
            policy_name: "block-criticals".to_string(),
            policy_type: PolicyType::ApprovalPolicy,
            rule: RuleSchema::ScanFinding(ScanFindingRule::default()),
            actions: Vec::new(),
            approval_settings: Default::default(),
            fallback_behavior: FallbackBehavior { fail },
            bypass_settings: None,
            send_bot_message: false,
            custom_roles: Vec::new(),
        }
    }

    #[test]
    fn data_violation_is_failed_even_under_fail_open() {
        let mut tracker = ViolationTracker::new();
        tracker.add_violation(
            &read(1, FailMode::Open),
            ids::RULE_SCAN_FINDING,
            json!({ "uuid": { "newly_detected": ["a"] } }),
        );

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Failed);
    }

    #[test]
    fn error_only_row_warns_under_fail_open() {
        let mut tracker = ViolationTracker::new();
        tracker.add_error(
            &read(1, FailMode::Open),
            &EvaluationError::ScannerRemoved {
                missing_scans: vec!["sast".to_string()],
            },
        );

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Warn);
        assert_eq!(rows[&1].data.errors[0].error, ids::ERROR_SCAN_REMOVED);
    }

    #[test]
    fn recorded_error_shape_is_stable() {
        let mut tracker = ViolationTracker::new();
        tracker.add_error(
            &read(1, FailMode::Closed),
            &EvaluationError::ScannerRemoved {
                missing_scans: vec!["sast".to_string()],
            },
        );

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        insta::assert_json_snapshot!(rows[&1].data, @r#"
        {
          "errors": [
            {
              "error": "SCAN_REMOVED",
              "missing_scans": [
                "sast"
              ]
            }
          ]
        }
        "#);
    }

    #[test]
    fn error_only_row_fails_under_fail_closed() {
        let mut tracker = ViolationTracker::new();
        tracker.add_error(&read(1, FailMode::Closed), &EvaluationError::FindingsPending);

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Failed);
        assert!(rows[&1].blocks_merge());
    }

    #[test]
    fn skip_only_row_is_skipped() {
        let mut tracker = ViolationTracker::new();
        tracker.skip(&read(1, FailMode::Closed));

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Skipped);
        assert_eq!(rows[&1].data.errors[0].error, ids::ERROR_EVALUATION_SKIPPED);
        assert!(!rows[&1].blocks_merge());
    }

    #[test]
    fn skip_plus_hard_error_fails() {
        let mut tracker = ViolationTracker::new();
        let r = read(1, FailMode::Closed);
        tracker.skip(&r);
        tracker.add_error(&r, &EvaluationError::FindingsPending);

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Failed);
    }

    #[test]
    fn pending_violation_without_data_is_running() {
        let mut tracker = ViolationTracker::new();
        tracker.add_violation_pending(&read(1, FailMode::Closed));

        let mut rows = BTreeMap::new();
        tracker.execute(&mut rows);

        assert_eq!(rows[&1].status, ViolationStatus::Running);
        assert!(rows[&1].blocks_merge());
    }

    #[test]
    fn unviolated_rows_are_removed() {
        let r = read(1, FailMode::Closed);
        let mut rows = BTreeMap::new();

        let mut tracker = ViolationTracker::new();
        tracker.add_violation(&r, ids::RULE_SCAN_FINDING, json!({ "uuid": {} }));
        tracker.execute(&mut rows);
        assert!(rows.contains_key(&1));

        let mut tracker = ViolationTracker::new();
        tracker.remove_violation(&r);
        let update = tracker.execute(&mut rows);

        assert!(rows.is_empty());
        assert_eq!(update.resolved, vec![1]);
    }

    #[test]
    fn replaying_an_unchanged_pass_reports_no_detections() {
        let r = read(1, FailMode::Closed);
        let mut rows = BTreeMap::new();

        let mut tracker = ViolationTracker::new();
        tracker.add_violation(&r, ids::RULE_SCAN_FINDING, json!({ "uuid": { "newly_detected": ["a"] } }));
        let first = tracker.execute(&mut rows);
        assert_eq!(first.detected, vec![1]);

        let mut tracker = ViolationTracker::new();
        tracker.add_violation(&r, ids::RULE_SCAN_FINDING, json!({ "uuid": { "newly_detected": ["a"] } }));
        let second = tracker.execute(&mut rows);

        assert!(second.detected.is_empty());
        assert!(second.resolved.is_empty());
    }
}
