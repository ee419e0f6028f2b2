//! `license_finding` rules: gate on dependency licenses from the dependency
//! scan.
//!
//! Two schema generations coexist. The current one carries explicit
//! `licenses.allowed` / `licenses.denied` entries with purl-level package
//! exceptions; the legacy one is a flat `license_types` list whose meaning
//! flips on `match_on_inclusion_license`. When both are present the current
//! schema wins (a parse-time warning was already recorded).

use super::{branch_matches, EvaluationError, RuleOutcome};
use crate::model::EvaluationContext;
use approvalguard_types::{
    ids, LicenseEntry, LicenseFindingRule, LicenseOccurrence, LicenseState,
};
use serde_json::json;
use std::collections::BTreeMap;

enum Criteria<'a> {
    Denylist(Vec<ResolvedEntry<'a>>),
    Allowlist(Vec<ResolvedEntry<'a>>),
}

struct ResolvedEntry<'a> {
    name: &'a str,
    excluded_purls: Vec<&'a str>,
}

impl<'a> ResolvedEntry<'a> {
    fn from_entry(entry: &'a LicenseEntry) -> Self {
        Self {
            name: &entry.name,
            excluded_purls: entry
                .packages
                .as_ref()
                .map(|p| p.excluding.purls.iter().map(String::as_str).collect())
                .unwrap_or_default(),
        }
    }

    fn bare(name: &'a str) -> Self {
        Self {
            name,
            excluded_purls: Vec::new(),
        }
    }

    /// Whether this entry covers the occurrence: name matches and the purl
    /// is not carved out by a package exception.
    fn covers(&self, occurrence: &LicenseOccurrence) -> bool {
        self.name.eq_ignore_ascii_case(&occurrence.license)
            && !self.excluded_purls.contains(&occurrence.purl.as_str())
    }
}

pub(super) fn evaluate(
    rule: &LicenseFindingRule,
    ctx: &EvaluationContext<'_>,
) -> Result<RuleOutcome, EvaluationError> {
    if !branch_matches(&rule.branches, &ctx.merge_request.target_branch) {
        return Ok(RuleOutcome::no_match());
    }

    let criteria = resolve_criteria(rule)?;

    // license name -> violating purls
    let mut violating: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    match &criteria {
        // Denied names are the narrow set; look them up directly.
        Criteria::Denylist(entries) => {
            for entry in entries {
                for occurrence in ctx.license_index.occurrences_of(entry.name) {
                    if state_selected(rule, occurrence.state)
                        && !entry.excluded_purls.contains(&occurrence.purl.as_str())
                    {
                        violating
                            .entry(occurrence.license.as_str())
                            .or_default()
                            .push(occurrence.purl.as_str());
                    }
                }
            }
        }
        // An allowlist has to sweep everything the scan saw.
        Criteria::Allowlist(entries) => {
            for (_, occurrences) in ctx.license_index.licenses() {
                for occurrence in occurrences {
                    if state_selected(rule, occurrence.state)
                        && !entries.iter().any(|e| e.covers(occurrence))
                    {
                        violating
                            .entry(occurrence.license.as_str())
                            .or_default()
                            .push(occurrence.purl.as_str());
                    }
                }
            }
        }
    }

    if violating.is_empty() {
        return Ok(RuleOutcome::no_match());
    }

    for purls in violating.values_mut() {
        purls.sort_unstable();
        purls.dedup();
    }
    Ok(RuleOutcome::matched(json!({ ids::KEY_LICENSES: violating })))
}

fn resolve_criteria<'a>(rule: &'a LicenseFindingRule) -> Result<Criteria<'a>, EvaluationError> {
    if let Some(licenses) = &rule.licenses {
        if !licenses.denied.is_empty() {
            return Ok(Criteria::Denylist(
                licenses.denied.iter().map(ResolvedEntry::from_entry).collect(),
            ));
        }
        if !licenses.allowed.is_empty() {
            return Ok(Criteria::Allowlist(
                licenses.allowed.iter().map(ResolvedEntry::from_entry).collect(),
            ));
        }
    }

    if let Some(license_types) = &rule.license_types {
        let entries = license_types.iter().map(|n| ResolvedEntry::bare(n)).collect();
        return Ok(match rule.match_on_inclusion_license {
            Some(false) => Criteria::Allowlist(entries),
            // Denylist interpretation is the legacy default.
            _ => Criteria::Denylist(entries),
        });
    }

    Err(EvaluationError::RuleContentInvalid(
        "license_finding rule has neither `licenses` nor `license_types`".to_string(),
    ))
}

fn state_selected(rule: &LicenseFindingRule, state: LicenseState) -> bool {
    rule.license_states.is_empty() || rule.license_states.contains(&state)
}
