//! Fixture builders shared across test suites.
//!
//! Builders return fully-populated values with sensible defaults; tests
//! mutate the few fields they care about.

#![forbid(unsafe_code)]

use approvalguard_domain::{MergeRequestRef, ScanSnapshot};
use approvalguard_types::{
    ActionSchema, AnyMergeRequestRule, CommitFilter, CommitInfo, FailMode, FallbackBehavior,
    FindingSeverity, LicenseFindingRule, LicenseOccurrence, LicenseState, NoLongerDetectedRule,
    PolicyDocument, PolicyType, RequireApprovalAction, RuleSchema, ScanFinding, ScanFindingRule,
    VulnerabilityState,
};

pub fn commit(sha: &str, signed: bool) -> CommitInfo {
    CommitInfo {
        sha: sha.to_string(),
        signed,
        author_email: None,
    }
}

pub fn merge_request(
    id: u64,
    project_id: u64,
    source_branch: &str,
    target_branch: &str,
    commits: Vec<CommitInfo>,
) -> MergeRequestRef {
    MergeRequestRef {
        id,
        project_id,
        source_branch: source_branch.to_string(),
        target_branch: target_branch.to_string(),
        commits,
    }
}

pub fn finding(uuid: &str, scanner: &str, severity: FindingSeverity, state: VulnerabilityState) -> ScanFinding {
    ScanFinding {
        uuid: uuid.to_string(),
        scanner: scanner.to_string(),
        severity,
        state,
        location: None,
        detected_at: None,
    }
}

pub fn license(name: &str, purl: &str, state: LicenseState) -> LicenseOccurrence {
    LicenseOccurrence {
        license: name.to_string(),
        purl: purl.to_string(),
        state,
    }
}

/// Snapshot with a completed (possibly empty) pipeline scan.
pub fn snapshot_with_findings(findings: Vec<ScanFinding>, scanners: &[&str]) -> ScanSnapshot {
    ScanSnapshot {
        pipeline_findings: Some(findings),
        target_findings: Vec::new(),
        running_scanners: scanners.iter().map(|s| s.to_string()).collect(),
        licenses: Vec::new(),
    }
}

fn approval_policy(name: &str, rule: RuleSchema, approvals_required: u32) -> PolicyDocument {
    PolicyDocument {
        policy_type: PolicyType::ApprovalPolicy,
        name: name.to_string(),
        description: None,
        enabled: true,
        policy_scope: None,
        rules: vec![rule],
        actions: vec![ActionSchema::RequireApproval(RequireApprovalAction {
            approvals_required,
            ..RequireApprovalAction::default()
        })],
        approval_settings: None,
        fallback_behavior: None,
        bypass_settings: None,
        metadata: None,
    }
}

/// Policy with one `any_merge_request` rule matching every commit.
pub fn any_merge_request_policy(name: &str, approvals_required: u32) -> PolicyDocument {
    approval_policy(
        name,
        RuleSchema::AnyMergeRequest(AnyMergeRequestRule {
            branches: Vec::new(),
            commits: CommitFilter::Any,
        }),
        approvals_required,
    )
}

/// Policy with one unrestricted `scan_finding` rule and the given fallback.
pub fn scan_finding_policy(name: &str, fail: FailMode) -> PolicyDocument {
    let mut policy = approval_policy(
        name,
        RuleSchema::ScanFinding(ScanFindingRule::default()),
        1,
    );
    policy.fallback_behavior = Some(FallbackBehavior { fail });
    policy
}

/// Vulnerability-management policy with one unrestricted
/// `no_longer_detected` rule.
pub fn no_longer_detected_policy(name: &str) -> PolicyDocument {
    PolicyDocument {
        policy_type: PolicyType::VulnerabilityManagementPolicy,
        name: name.to_string(),
        description: None,
        enabled: true,
        policy_scope: None,
        rules: vec![RuleSchema::NoLongerDetected(NoLongerDetectedRule::default())],
        actions: Vec::new(),
        approval_settings: None,
        fallback_behavior: None,
        bypass_settings: None,
        metadata: None,
    }
}

/// Policy with one `license_finding` rule denying the named licenses.
pub fn license_denylist_policy(name: &str, denied: &[&str]) -> PolicyDocument {
    approval_policy(
        name,
        RuleSchema::LicenseFinding(LicenseFindingRule {
            branches: Vec::new(),
            licenses: Some(approvalguard_types::LicenseCriteria {
                allowed: Vec::new(),
                denied: denied
                    .iter()
                    .map(|n| approvalguard_types::LicenseEntry {
                        name: n.to_string(),
                        packages: None,
                    })
                    .collect(),
            }),
            license_types: None,
            match_on_inclusion_license: None,
            license_states: Vec::new(),
        }),
        1,
    )
}
