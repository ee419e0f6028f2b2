//! Synchronized approval rules derived from rule outcomes.
//!
//! Rules are grouped by rule-type category. Within a category the approval
//! requirement is the maximum demanded by any matching rule, never the sum,
//! and approver sets are unioned.

use crate::reads::ScanResultPolicyRead;
use approvalguard_domain::RuleOutcome;
use approvalguard_types::ApproverSet;
use std::collections::BTreeMap;

/// Approval lifecycle of a merge request with respect to policy rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApprovalState {
    /// No evaluation has run yet.
    #[default]
    Pending,
    /// Approvals are withheld while a synchronization is in flight.
    TemporarilyUnapproved,
    /// All synchronized rules are satisfied.
    Approved,
    /// At least one synchronized rule is unsatisfied or blocked.
    Unapproved,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncedApprovalRule {
    /// Category name, one rule per rule-type.
    pub name: String,
    /// Policy reads that contributed to this rule.
    pub policy_read_ids: Vec<u64>,
    pub approvals_required: u32,
    pub approvers: ApproverSet,
}

impl SyncedApprovalRule {
    pub fn satisfied_by(&self, approvals: usize) -> bool {
        approvals >= self.approvals_required as usize
    }
}

/// Fold matched outcomes into one approval rule per category.
pub fn compute_approval_rules(
    outcomes: &[(&ScanResultPolicyRead, &RuleOutcome)],
) -> Vec<SyncedApprovalRule> {
    let mut by_category: BTreeMap<&str, SyncedApprovalRule> = BTreeMap::new();

    for (read, outcome) in outcomes {
        if !outcome.matched {
            continue;
        }
        let category = read.rule.type_name();
        let rule = by_category
            .entry(category)
            .or_insert_with(|| SyncedApprovalRule {
                name: category.to_string(),
                policy_read_ids: Vec::new(),
                approvals_required: 0,
                approvers: ApproverSet::default(),
            });
        rule.policy_read_ids.push(read.id);
        rule.approvals_required = rule.approvals_required.max(outcome.approvals_required);
        rule.approvers.union_with(&outcome.approvers);
    }

    by_category.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvalguard_types::{
        FallbackBehavior, PolicyType, RuleSchema, ScanFindingRule,
    };

    fn read(id: u64, rule: RuleSchema) -> ScanResultPolicyRead {
        ScanResultPolicyRead {
            id,
            configuration_id: 1,
            project_id: 1,
            policy_index: 0,
            rule_index: 0,
            policy_name: format!("policy-{id}"),
            policy_type: PolicyType::ApprovalPolicy,
            rule,
            actions: Vec::new(),
            approval_settings: Default::default(),
            fallback_behavior: FallbackBehavior::default(),
            bypass_settings: None,
            send_bot_message: false,
            custom_roles: Vec::new(),
        }
    }

    fn matched(approvals_required: u32, user: &str) -> RuleOutcome {
        let mut approvers = ApproverSet::default();
        approvers.users.insert(user.to_string());
        RuleOutcome {
            matched: true,
            detail: Some(serde_json::json!({})),
            approvals_required,
            approvers,
        }
    }

    #[test]
    fn same_category_takes_the_maximum_not_the_sum() {
        let a = read(1, RuleSchema::ScanFinding(ScanFindingRule::default()));
        let b = read(2, RuleSchema::ScanFinding(ScanFindingRule::default()));
        let oa = matched(2, "alice");
        let ob = matched(3, "bob");

        let rules = compute_approval_rules(&[(&a, &oa), (&b, &ob)]);

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].approvals_required, 3);
        assert_eq!(rules[0].policy_read_ids, vec![1, 2]);
        assert!(rules[0].approvers.users.contains("alice"));
        assert!(rules[0].approvers.users.contains("bob"));
    }

    #[test]
    fn unmatched_outcomes_contribute_nothing() {
        let a = read(1, RuleSchema::ScanFinding(ScanFindingRule::default()));
        let outcome = RuleOutcome::default();

        assert!(compute_approval_rules(&[(&a, &outcome)]).is_empty());
    }

    #[test]
    fn satisfied_by_counts_distinct_approvals() {
        let rule = SyncedApprovalRule {
            name: "scan_finding".to_string(),
            policy_read_ids: vec![1],
            approvals_required: 2,
            approvers: ApproverSet::default(),
        };

        assert!(!rule.satisfied_by(1));
        assert!(rule.satisfied_by(2));
    }
}
