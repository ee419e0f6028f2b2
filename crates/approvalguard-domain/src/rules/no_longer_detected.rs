//! `no_longer_detected` rules (vulnerability-management policies): findings
//! that were present on the target branch but are absent from the latest
//! scan. Drives auto-resolution, never approval gating.

use super::{branch_matches, EvaluationError, RuleOutcome};
use crate::model::EvaluationContext;
use approvalguard_types::{ids, NoLongerDetectedRule};
use serde_json::json;
use std::collections::BTreeSet;

pub(super) fn evaluate(
    rule: &NoLongerDetectedRule,
    ctx: &EvaluationContext<'_>,
) -> Result<RuleOutcome, EvaluationError> {
    if !branch_matches(&rule.branches, &ctx.merge_request.target_branch) {
        return Ok(RuleOutcome::no_match());
    }

    let current = ctx
        .snapshot
        .pipeline_findings
        .as_ref()
        .ok_or(EvaluationError::FindingsPending)?;
    let current_uuids: BTreeSet<&str> = current.iter().map(|f| f.uuid.as_str()).collect();

    let mut resolved: Vec<&str> = ctx
        .snapshot
        .target_findings
        .iter()
        .filter(|f| rule.scanners.is_empty() || rule.scanners.contains(&f.scanner))
        .filter(|f| rule.severity_levels.is_empty() || rule.severity_levels.contains(&f.severity))
        .filter(|f| !current_uuids.contains(f.uuid.as_str()))
        .map(|f| f.uuid.as_str())
        .collect();
    resolved.sort_unstable();
    resolved.dedup();

    if resolved.is_empty() {
        Ok(RuleOutcome::no_match())
    } else {
        Ok(RuleOutcome::matched(
            json!({ ids::KEY_UUID: { ids::RULE_NO_LONGER_DETECTED: resolved } }),
        ))
    }
}
