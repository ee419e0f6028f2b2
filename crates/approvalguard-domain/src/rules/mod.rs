//! Per-rule-type evaluation.
//!
//! Dispatch is a `match` over the rule tag; each rule kind lives in its own
//! module. Per-rule failures are isolated by the caller — an error here
//! never aborts sibling rules.

use crate::model::EvaluationContext;
use approvalguard_types::{ids, ActionSchema, ApproverSet, PolicyDocument, RuleSchema};
use serde_json::Value as JsonValue;
use thiserror::Error;

mod any_merge_request;
mod branches;
mod license_finding;
mod no_longer_detected;
mod scan_finding;

pub(crate) use branches::branch_matches;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    /// The pipeline no longer runs a scanner the rule depends on.
    #[error("scanners removed from pipeline: {missing_scans:?}")]
    ScannerRemoved { missing_scans: Vec<String> },
    /// Scan data has not arrived yet; the rule stays not-yet-evaluated.
    #[error("scan findings not yet available")]
    FindingsPending,
    #[error("rule content invalid: {0}")]
    RuleContentInvalid(String),
    /// Scan data never arrived within the bounded window.
    #[error("evaluation timed out")]
    Timeout,
}

impl EvaluationError {
    /// Stable code recorded under `violation_data.errors`.
    pub fn code(&self) -> &'static str {
        match self {
            EvaluationError::ScannerRemoved { .. } => ids::ERROR_SCAN_REMOVED,
            EvaluationError::FindingsPending => ids::ERROR_ARTIFACTS_MISSING,
            EvaluationError::RuleContentInvalid(_) => ids::ERROR_RULE_CONTENT_INVALID,
            EvaluationError::Timeout => ids::ERROR_EVALUATION_TIMEOUT,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleOutcome {
    pub matched: bool,
    /// Rule-type-specific violation detail; present only when matched.
    pub detail: Option<JsonValue>,
    /// Approvals demanded by the owning policy when the rule matches.
    pub approvals_required: u32,
    pub approvers: ApproverSet,
}

impl RuleOutcome {
    fn no_match() -> Self {
        Self::default()
    }

    fn matched(detail: JsonValue) -> Self {
        Self {
            matched: true,
            detail: Some(detail),
            approvals_required: 0,
            approvers: ApproverSet::default(),
        }
    }
}

/// Evaluate one rule of `policy` against the context. Approval requirements
/// from the policy's `require_approval` action are attached on match.
pub fn evaluate_rule(
    policy: &PolicyDocument,
    rule: &RuleSchema,
    ctx: &EvaluationContext<'_>,
) -> Result<RuleOutcome, EvaluationError> {
    let mut outcome = match rule {
        RuleSchema::ScanFinding(rule) => scan_finding::evaluate(rule, ctx)?,
        RuleSchema::LicenseFinding(rule) => license_finding::evaluate(rule, ctx)?,
        RuleSchema::AnyMergeRequest(rule) => any_merge_request::evaluate(rule, ctx),
        RuleSchema::NoLongerDetected(rule) => no_longer_detected::evaluate(rule, ctx)?,
        // Execution rules schedule pipelines; they never gate approvals.
        RuleSchema::Pipeline(_) | RuleSchema::Schedule(_) => RuleOutcome::no_match(),
    };

    if outcome.matched {
        for action in &policy.actions {
            if let ActionSchema::RequireApproval(action) = action {
                outcome.approvals_required = outcome.approvals_required.max(action.approvals_required);
                outcome.approvers.users.extend(action.user_approvers.iter().cloned());
                outcome.approvers.groups.extend(action.group_approvers.iter().cloned());
                outcome.approvers.roles.extend(action.role_approvers.iter().cloned());
            }
        }
    }

    Ok(outcome)
}
