//! `scan_finding` rules: gate on vulnerability findings from the head
//! pipeline.

use super::{branch_matches, EvaluationError, RuleOutcome};
use crate::model::EvaluationContext;
use approvalguard_types::policy::{AgeInterval, AgeOperator};
use approvalguard_types::{ids, ScanFinding, ScanFindingRule};
use serde_json::json;
use time::Duration;

pub(super) fn evaluate(
    rule: &ScanFindingRule,
    ctx: &EvaluationContext<'_>,
) -> Result<RuleOutcome, EvaluationError> {
    if !branch_matches(&rule.branches, &ctx.merge_request.target_branch) {
        return Ok(RuleOutcome::no_match());
    }

    let findings = ctx
        .snapshot
        .pipeline_findings
        .as_ref()
        .ok_or(EvaluationError::FindingsPending)?;

    if !rule.scanners.is_empty() {
        let missing_scans: Vec<String> = rule
            .scanners
            .iter()
            .filter(|s| !ctx.snapshot.running_scanners.contains(s))
            .cloned()
            .collect();
        if !missing_scans.is_empty() {
            return Err(EvaluationError::ScannerRemoved { missing_scans });
        }
    }

    let mut newly_detected: Vec<&str> = Vec::new();
    let mut previously_existing: Vec<&str> = Vec::new();

    for finding in findings {
        if !finding_selected(rule, finding) {
            continue;
        }
        if finding.state.is_new() {
            if age_selected(rule, finding, ctx) {
                newly_detected.push(&finding.uuid);
            }
        } else {
            previously_existing.push(&finding.uuid);
        }
    }

    newly_detected.sort_unstable();
    previously_existing.sort_unstable();

    if (newly_detected.len() as u32) > rule.vulnerabilities_allowed {
        let mut uuid = serde_json::Map::new();
        uuid.insert(ids::KEY_NEWLY_DETECTED.to_string(), json!(newly_detected));
        if !previously_existing.is_empty() {
            uuid.insert(
                ids::KEY_PREVIOUSLY_EXISTING.to_string(),
                json!(previously_existing),
            );
        }
        Ok(RuleOutcome::matched(json!({ ids::KEY_UUID: uuid })))
    } else {
        Ok(RuleOutcome::no_match())
    }
}

fn finding_selected(rule: &ScanFindingRule, finding: &ScanFinding) -> bool {
    if !rule.scanners.is_empty() && !rule.scanners.contains(&finding.scanner) {
        return false;
    }
    if !rule.severity_levels.is_empty() && !rule.severity_levels.contains(&finding.severity) {
        return false;
    }
    if rule.vulnerability_states.is_empty() {
        // Empty state list means "newly detected": both new states count,
        // pre-existing findings are still surfaced but never gate.
        return true;
    }
    rule.vulnerability_states.contains(&finding.state)
}

/// Apply the optional vulnerability-age window to a newly-detected finding.
/// A finding without a detection timestamp cannot satisfy an age window.
fn age_selected(rule: &ScanFindingRule, finding: &ScanFinding, ctx: &EvaluationContext<'_>) -> bool {
    let Some(age) = &rule.vulnerability_age else {
        return true;
    };
    let Some(detected_at) = finding.detected_at else {
        return false;
    };

    let window = match age.interval {
        AgeInterval::Day => Duration::days(i64::from(age.value)),
        AgeInterval::Week => Duration::weeks(i64::from(age.value)),
        AgeInterval::Month => Duration::days(30 * i64::from(age.value)),
        AgeInterval::Year => Duration::days(365 * i64::from(age.value)),
    };
    let finding_age = ctx.now - detected_at;

    match age.operator {
        AgeOperator::GreaterThan => finding_age > window,
        AgeOperator::LessThan => finding_age < window,
    }
}
