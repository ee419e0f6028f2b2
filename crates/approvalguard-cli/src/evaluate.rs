//! One-shot policy evaluation producing a report envelope.
//!
//! The CLI treats the policy file as the already-scoped set: scope
//! resolution across group hierarchies is a library concern and needs
//! project metadata the command line does not carry.

use approvalguard_domain::{
    evaluate_rule, resolve_enforcement, BypassActor, EnforcementReason, EvaluationContext,
    EvaluationError, MergeRequestRef, ScanSnapshot,
};
use approvalguard_types::{
    ApproverSet, DecisionStatus, EvaluationReport, PolicyDecision, PolicyDocument, PolicyType,
    ToolMeta, ViolationData, SCHEMA_EVALUATION_REPORT_V1,
};
use time::OffsetDateTime;

pub fn evaluate_policies(
    policies: &[PolicyDocument],
    merge_request: &MergeRequestRef,
    snapshot: &ScanSnapshot,
    actor: Option<&BypassActor>,
    now: OffsetDateTime,
) -> EvaluationReport {
    let started_at = now;
    let ctx = EvaluationContext::new(merge_request, snapshot, now);

    let mut decisions = Vec::new();
    for policy in policies {
        // Approval policies gate the merge; vulnerability-management
        // policies report resolutions. Execution policies have no
        // merge-time behavior.
        let relevant = matches!(
            policy.policy_type,
            PolicyType::ApprovalPolicy | PolicyType::VulnerabilityManagementPolicy
        );
        if !relevant || !policy.enabled {
            continue;
        }
        decisions.push(decide(policy, merge_request, &ctx, actor));
    }

    let blocked = decisions.iter().any(|d| d.enforce);
    EvaluationReport {
        schema: SCHEMA_EVALUATION_REPORT_V1.to_string(),
        tool: ToolMeta {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        started_at,
        finished_at: OffsetDateTime::now_utc(),
        blocked,
        decisions,
    }
}

fn decide(
    policy: &PolicyDocument,
    merge_request: &MergeRequestRef,
    ctx: &EvaluationContext<'_>,
    actor: Option<&BypassActor>,
) -> PolicyDecision {
    let mut violation = ViolationData::default();
    let mut matched_any = false;
    let mut pending = false;
    let mut first_error = None;
    let mut approvals_required = 0u32;
    let mut approvers = ApproverSet::default();

    for rule in &policy.rules {
        match evaluate_rule(policy, rule, ctx) {
            Ok(outcome) if outcome.matched => {
                matched_any = true;
                if let Some(detail) = outcome.detail {
                    violation.merge_rule_data(rule.type_name(), detail);
                }
                approvals_required = approvals_required.max(outcome.approvals_required);
                approvers.union_with(&outcome.approvers);
            }
            Ok(_) => {}
            Err(error) => {
                pending |= matches!(error, EvaluationError::FindingsPending);
                violation.add_error(error_row(&error));
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
    }

    // Vulnerability-management policies never enforce; a match means the
    // findings auto-resolve.
    if policy.policy_type == PolicyType::VulnerabilityManagementPolicy {
        let status = if matched_any {
            DecisionStatus::Resolved
        } else if pending {
            DecisionStatus::Unevaluated
        } else if first_error.is_some() {
            DecisionStatus::Errored
        } else {
            DecisionStatus::Passed
        };
        return PolicyDecision {
            policy_name: policy.name.clone(),
            policy_type: policy.policy_type,
            status,
            enforce: false,
            reason: None,
            fallback_applied: false,
            approvals_required: 0,
            approvers: ApproverSet::default(),
            violation: (!violation.is_empty()).then_some(violation),
        };
    }

    let evaluation = match &first_error {
        Some(error) if !matched_any => Err(error),
        _ => Ok(matched_any),
    };
    let decision = resolve_enforcement(
        evaluation,
        policy.fallback_fail_mode(),
        policy.bypass_settings.as_ref(),
        actor,
        &merge_request.target_branch,
    );

    let status = if matched_any {
        DecisionStatus::Violated
    } else if pending {
        DecisionStatus::Unevaluated
    } else if first_error.is_some() {
        DecisionStatus::Errored
    } else {
        DecisionStatus::Passed
    };

    PolicyDecision {
        policy_name: policy.name.clone(),
        policy_type: policy.policy_type,
        status,
        enforce: decision.enforce,
        reason: Some(reason_label(decision.reason).to_string()),
        fallback_applied: matches!(
            decision.reason,
            EnforcementReason::FallbackOpen | EnforcementReason::FallbackClosed
        ),
        approvals_required,
        approvers,
        violation: (!violation.is_empty()).then_some(violation),
    }
}

fn error_row(error: &EvaluationError) -> approvalguard_types::ViolationError {
    match error {
        EvaluationError::ScannerRemoved { missing_scans } => {
            let mut extra = serde_json::Map::new();
            extra.insert(
                "missing_scans".to_string(),
                serde_json::Value::from(missing_scans.clone()),
            );
            approvalguard_types::ViolationError::with_extra(error.code(), extra)
        }
        _ => approvalguard_types::ViolationError::new(error.code()),
    }
}

fn reason_label(reason: EnforcementReason) -> &'static str {
    match reason {
        EnforcementReason::NoViolation => "no_violation",
        EnforcementReason::ViolationFound => "violation_found",
        EnforcementReason::FallbackClosed => "fallback_closed",
        EnforcementReason::FallbackOpen => "fallback_open",
        EnforcementReason::BypassAccessToken => "bypass_access_token",
        EnforcementReason::BypassServiceAccount => "bypass_service_account",
        EnforcementReason::BranchException => "branch_exception",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvalguard_test_util::{
        any_merge_request_policy, commit, finding, merge_request, no_longer_detected_policy,
        scan_finding_policy, snapshot_with_findings,
    };
    use approvalguard_types::{FailMode, FindingSeverity, VulnerabilityState};

    fn mr() -> MergeRequestRef {
        merge_request(1, 1, "feature", "main", vec![commit("abc", true)])
    }

    #[test]
    fn matched_policy_blocks_the_report() {
        let policies = vec![any_merge_request_policy("block-any", 1)];
        let snapshot = ScanSnapshot::default();

        let report = evaluate_policies(
            &policies,
            &mr(),
            &snapshot,
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(report.blocked);
        assert_eq!(report.decisions[0].status, DecisionStatus::Violated);
        assert_eq!(report.decisions[0].approvals_required, 1);
    }

    #[test]
    fn pending_scan_data_is_unevaluated_and_fails_closed() {
        let policies = vec![scan_finding_policy("block-criticals", FailMode::Closed)];
        let snapshot = ScanSnapshot::default();

        let report = evaluate_policies(
            &policies,
            &mr(),
            &snapshot,
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(report.blocked);
        assert_eq!(report.decisions[0].status, DecisionStatus::Unevaluated);
        assert!(report.decisions[0].fallback_applied);
    }

    #[test]
    fn pending_scan_data_passes_open_without_hiding_the_error() {
        let policies = vec![scan_finding_policy("block-criticals", FailMode::Open)];
        let snapshot = ScanSnapshot::default();

        let report = evaluate_policies(
            &policies,
            &mr(),
            &snapshot,
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(!report.blocked);
        let decision = &report.decisions[0];
        assert!(decision.violation.as_ref().is_some_and(|v| v.has_errors()));
    }

    #[test]
    fn clean_scan_passes() {
        let policies = vec![scan_finding_policy("block-criticals", FailMode::Closed)];
        let snapshot = snapshot_with_findings(Vec::new(), &[]);

        let report = evaluate_policies(
            &policies,
            &mr(),
            &snapshot,
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(!report.blocked);
        assert_eq!(report.decisions[0].status, DecisionStatus::Passed);
    }

    #[test]
    fn vanished_findings_are_reported_resolved_without_gating() {
        let policies = vec![no_longer_detected_policy("auto-resolve")];
        let mut snapshot = snapshot_with_findings(Vec::new(), &["sast"]);
        snapshot.target_findings = vec![finding(
            "gone",
            "sast",
            FindingSeverity::High,
            VulnerabilityState::Detected,
        )];

        let report = evaluate_policies(
            &policies,
            &mr(),
            &snapshot,
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(!report.blocked);
        let decision = &report.decisions[0];
        assert_eq!(decision.status, DecisionStatus::Resolved);
        assert!(!decision.enforce);
        assert!(decision
            .violation
            .as_ref()
            .is_some_and(|v| v.violations.contains_key("no_longer_detected")));
    }

    #[test]
    fn disabled_policies_are_not_evaluated() {
        let mut policy = any_merge_request_policy("off", 1);
        policy.enabled = false;

        let report = evaluate_policies(
            &[policy],
            &mr(),
            &ScanSnapshot::default(),
            None,
            OffsetDateTime::UNIX_EPOCH,
        );

        assert!(report.decisions.is_empty());
        assert!(!report.blocked);
    }
}
