//! Policy file parsing and validation.
//!
//! A policy file is a YAML mapping with one list per policy type:
//!
//! ```yaml
//! approval_policy:
//!   - name: Critical findings
//!     enabled: true
//!     rules: [...]
//!     actions: [...]
//! scan_execution_policy:
//!   - name: Nightly DAST
//!     ...
//! ```
//!
//! Per-policy failures are isolated: one malformed entry never aborts
//! parsing of its siblings.

use approvalguard_types::{ActionSchema, PolicyDocument, RuleSchema};
use globset::Glob;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Top-level keys recognized in a policy file, with the `type` value injected
/// into entries that omit it. `scan_result_policy` is the historical name of
/// `approval_policy` and is accepted on read.
const POLICY_KEYS: &[(&str, &str)] = &[
    ("approval_policy", "approval_policy"),
    ("scan_result_policy", "approval_policy"),
    ("scan_execution_policy", "scan_execution_policy"),
    ("pipeline_execution_policy", "pipeline_execution_policy"),
    (
        "vulnerability_management_policy",
        "vulnerability_management_policy",
    ),
    (
        "pipeline_execution_schedule_policy",
        "pipeline_execution_schedule_policy",
    ),
];

const MAX_NAME_LENGTH: usize = 255;

#[derive(Debug, Error)]
pub enum PolicyParseError {
    #[error("policy file is not valid YAML: {0}")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("policy file root must be a mapping")]
    RootNotMapping,
    #[error("policy name must be 1-{MAX_NAME_LENGTH} characters")]
    InvalidName,
    #[error("approval policies require at least one rule")]
    MissingRules,
    #[error("invalid branch pattern '{pattern}': {source}")]
    InvalidBranchPattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("policy entry is schema-invalid: {0}")]
    InvalidContent(String),
}

/// Non-fatal observations surfaced to the policy author.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationWarning {
    /// Both the legacy (`license_types`) and current (`licenses`) schemas are
    /// present on one rule; the current schema wins.
    ConflictingLicenseSchemas { policy: String, rule_index: usize },
    /// An approval policy carries rules but no `require_approval` action, so
    /// a match can never gate merging.
    NoRequireApprovalAction { policy: String },
}

/// A policy entry that failed to parse or validate, with its siblings intact.
#[derive(Debug)]
pub struct PolicyFileEntryError {
    /// The top-level key the entry appeared under.
    pub section: String,
    /// Position within that section's list.
    pub index: usize,
    pub name: Option<String>,
    pub error: PolicyParseError,
}

#[derive(Debug, Default)]
pub struct ParsedPolicies {
    pub policies: Vec<PolicyDocument>,
    pub warnings: Vec<ValidationWarning>,
    pub errors: Vec<PolicyFileEntryError>,
}

/// Parse and validate a policy file. Returns every well-formed policy plus
/// warnings and isolated per-entry errors.
pub fn parse_policy_file(yaml: &str) -> Result<ParsedPolicies, PolicyParseError> {
    let root: serde_yaml::Value = serde_yaml::from_str(yaml)?;
    let root = serde_json::to_value(&root)
        .map_err(|e| PolicyParseError::InvalidContent(e.to_string()))?;
    let JsonValue::Object(map) = root else {
        return Err(PolicyParseError::RootNotMapping);
    };

    let mut parsed = ParsedPolicies::default();

    for (section, type_name) in POLICY_KEYS {
        let Some(JsonValue::Array(entries)) = map.get(*section) else {
            continue;
        };

        for (index, entry) in entries.iter().enumerate() {
            let mut entry = entry.clone();
            if let Some(obj) = entry.as_object_mut() {
                obj.entry("type".to_string())
                    .or_insert_with(|| JsonValue::String(type_name.to_string()));
            }
            let name = entry
                .get("name")
                .and_then(JsonValue::as_str)
                .map(str::to_string);

            match deserialize_and_validate(entry, &mut parsed.warnings) {
                Ok(document) => parsed.policies.push(document),
                Err(error) => parsed.errors.push(PolicyFileEntryError {
                    section: section.to_string(),
                    index,
                    name,
                    error,
                }),
            }
        }
    }

    Ok(parsed)
}

fn deserialize_and_validate(
    entry: JsonValue,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<PolicyDocument, PolicyParseError> {
    let document: PolicyDocument = serde_json::from_value(entry)
        .map_err(|e| PolicyParseError::InvalidContent(e.to_string()))?;
    validate_document(&document, warnings)?;
    Ok(document)
}

fn validate_document(
    document: &PolicyDocument,
    warnings: &mut Vec<ValidationWarning>,
) -> Result<(), PolicyParseError> {
    if document.name.is_empty() || document.name.len() > MAX_NAME_LENGTH {
        return Err(PolicyParseError::InvalidName);
    }

    if document.policy_type == approvalguard_types::PolicyType::ApprovalPolicy {
        if document.rules.is_empty() {
            return Err(PolicyParseError::MissingRules);
        }
        let requires_approval = document
            .actions
            .iter()
            .any(|a| matches!(a, ActionSchema::RequireApproval(_)));
        if !requires_approval {
            warnings.push(ValidationWarning::NoRequireApprovalAction {
                policy: document.name.clone(),
            });
        }
    }

    for (rule_index, rule) in document.rules.iter().enumerate() {
        for pattern in rule.branches() {
            Glob::new(pattern).map_err(|source| PolicyParseError::InvalidBranchPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }

        if let RuleSchema::LicenseFinding(license_rule) = rule
            && license_rule.licenses.is_some()
            && license_rule.license_types.is_some()
        {
            warnings.push(ValidationWarning::ConflictingLicenseSchemas {
                policy: document.name.clone(),
                rule_index,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approvalguard_types::{CommitFilter, PolicyType};

    const BASIC_FILE: &str = r#"
approval_policy:
  - name: Critical findings
    enabled: true
    rules:
      - type: scan_finding
        scanners: [container_scanning]
        severity_levels: [critical]
        vulnerability_states: [new_needs_triage]
        vulnerabilities_allowed: 0
    actions:
      - type: require_approval
        approvals_required: 2
        user_approvers: [security-lead]
scan_execution_policy:
  - name: Nightly scans
    enabled: true
    rules:
      - type: schedule
        cadence: "0 2 * * *"
        branches: [main]
"#;

    #[test]
    fn parses_sections_into_typed_documents() {
        let parsed = parse_policy_file(BASIC_FILE).expect("parse");

        assert_eq!(parsed.policies.len(), 2);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.policies[0].policy_type, PolicyType::ApprovalPolicy);
        assert_eq!(
            parsed.policies[1].policy_type,
            PolicyType::ScanExecutionPolicy
        );
    }

    #[test]
    fn legacy_scan_result_policy_key_maps_to_approval_policy() {
        let yaml = r#"
scan_result_policy:
  - name: Legacy
    enabled: true
    rules:
      - type: any_merge_request
        commits: any
"#;
        let parsed = parse_policy_file(yaml).expect("parse");

        assert_eq!(parsed.policies.len(), 1);
        assert_eq!(parsed.policies[0].policy_type, PolicyType::ApprovalPolicy);
        match &parsed.policies[0].rules[0] {
            RuleSchema::AnyMergeRequest(rule) => assert_eq!(rule.commits, CommitFilter::Any),
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn malformed_entry_does_not_abort_siblings() {
        let yaml = r#"
approval_policy:
  - name: Broken
    enabled: true
    rules:
      - type: unknown_rule_kind
  - name: Fine
    enabled: true
    rules:
      - type: any_merge_request
        commits: unsigned
    actions:
      - type: require_approval
        approvals_required: 1
"#;
        let parsed = parse_policy_file(yaml).expect("parse");

        assert_eq!(parsed.policies.len(), 1);
        assert_eq!(parsed.policies[0].name, "Fine");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].name.as_deref(), Some("Broken"));
    }

    #[test]
    fn approval_policy_without_rules_is_rejected() {
        let yaml = r#"
approval_policy:
  - name: Empty
    enabled: true
"#;
        let parsed = parse_policy_file(yaml).expect("parse");

        assert!(parsed.policies.is_empty());
        assert!(matches!(
            parsed.errors[0].error,
            PolicyParseError::MissingRules
        ));
    }

    #[test]
    fn conflicting_license_schemas_warn_and_keep_policy() {
        let yaml = r#"
approval_policy:
  - name: Licenses
    enabled: true
    rules:
      - type: license_finding
        match_on_inclusion_license: true
        license_types: [MIT License]
        licenses:
          denied:
            - name: MIT License
        license_states: [newly_detected]
    actions:
      - type: require_approval
        approvals_required: 1
"#;
        let parsed = parse_policy_file(yaml).expect("parse");

        assert_eq!(parsed.policies.len(), 1);
        assert!(parsed.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::ConflictingLicenseSchemas { rule_index: 0, .. }
        )));
    }

    #[test]
    fn invalid_branch_glob_is_rejected() {
        let yaml = r#"
approval_policy:
  - name: Bad branches
    enabled: true
    rules:
      - type: any_merge_request
        commits: any
        branches: ["release/[" ]
"#;
        let parsed = parse_policy_file(yaml).expect("parse");

        assert!(matches!(
            parsed.errors[0].error,
            PolicyParseError::InvalidBranchPattern { .. }
        ));
    }
}
