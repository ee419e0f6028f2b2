//! The on-disk policy document schema.
//!
//! This is a *user-facing* model: it is intentionally permissive so that
//! forward-compat is easy. Validation and schema reconciliation happen in
//! `approvalguard-policy`, not here.

use crate::findings::{FindingSeverity, LicenseState, VulnerabilityState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    ApprovalPolicy,
    ScanExecutionPolicy,
    PipelineExecutionPolicy,
    VulnerabilityManagementPolicy,
    PipelineExecutionSchedulePolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyDocument {
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_scope: Option<PolicyScope>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_settings: Option<ApprovalSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_behavior: Option<FallbackBehavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bypass_settings: Option<BypassSettings>,
    /// Open-ended authoring metadata; carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl PolicyDocument {
    pub fn fallback_fail_mode(&self) -> FailMode {
        self.fallback_behavior
            .as_ref()
            .map(|f| f.fail)
            .unwrap_or_default()
    }
}

/// Reference to an entity by id, as written in policy YAML (`- id: 42`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IdRef {
    pub id: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyScope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compliance_frameworks: Vec<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projects: Option<ProjectScope>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectScope {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub including: Vec<IdRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluding: Vec<IdRef>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleSchema {
    ScanFinding(ScanFindingRule),
    LicenseFinding(LicenseFindingRule),
    AnyMergeRequest(AnyMergeRequestRule),
    NoLongerDetected(NoLongerDetectedRule),
    Pipeline(PipelineRule),
    Schedule(ScheduleRule),
}

impl RuleSchema {
    /// Stable rule-type name, used as the key in violation data.
    pub fn type_name(&self) -> &'static str {
        match self {
            RuleSchema::ScanFinding(_) => crate::ids::RULE_SCAN_FINDING,
            RuleSchema::LicenseFinding(_) => crate::ids::RULE_LICENSE_FINDING,
            RuleSchema::AnyMergeRequest(_) => crate::ids::RULE_ANY_MERGE_REQUEST,
            RuleSchema::NoLongerDetected(_) => crate::ids::RULE_NO_LONGER_DETECTED,
            RuleSchema::Pipeline(_) => "pipeline",
            RuleSchema::Schedule(_) => "schedule",
        }
    }

    /// Branch patterns the rule is restricted to. Empty means all branches.
    pub fn branches(&self) -> &[String] {
        match self {
            RuleSchema::ScanFinding(r) => &r.branches,
            RuleSchema::LicenseFinding(r) => &r.branches,
            RuleSchema::AnyMergeRequest(r) => &r.branches,
            RuleSchema::NoLongerDetected(r) => &r.branches,
            RuleSchema::Pipeline(r) => &r.branches,
            RuleSchema::Schedule(r) => &r.branches,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScanFindingRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scanners: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severity_levels: Vec<FindingSeverity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vulnerability_states: Vec<VulnerabilityState>,
    /// Number of matching newly-detected findings tolerated before the rule
    /// matches. Defaults to zero.
    #[serde(default)]
    pub vulnerabilities_allowed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_age: Option<VulnerabilityAge>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgeOperator {
    GreaterThan,
    LessThan,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgeInterval {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VulnerabilityAge {
    pub operator: AgeOperator,
    pub interval: AgeInterval,
    pub value: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseFindingRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    /// Current schema: explicit allow/deny lists with package exceptions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licenses: Option<LicenseCriteria>,
    /// Legacy schema: flat license-name list interpreted via
    /// `match_on_inclusion_license`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_types: Option<Vec<String>>,
    /// Legacy schema: `true` = `license_types` is a denylist, `false` = an
    /// allowlist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_on_inclusion_license: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub license_states: Vec<LicenseState>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseCriteria {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<LicenseEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub denied: Vec<LicenseEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<PackageExceptions>,
}

/// Package-level exceptions: purls removed from a license's scope even when
/// the license itself matches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PackageExceptions {
    #[serde(default)]
    pub excluding: PurlList,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PurlList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub purls: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommitFilter {
    /// Any commit on the source branch triggers the rule.
    Any,
    /// Only unsigned commits trigger the rule.
    Unsigned,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnyMergeRequestRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    pub commits: CommitFilter,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct NoLongerDetectedRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scanners: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub severity_levels: Vec<FindingSeverity>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
    pub cadence: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSchema {
    RequireApproval(RequireApprovalAction),
    SendBotMessage { enabled: bool },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RequireApprovalAction {
    pub approvals_required: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_approvers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_approvers: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub role_approvers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApprovalSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_approval_by_author: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_approval_by_commit_author: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_approvals_with_new_commit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_password_to_approve: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_branch_modification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_pushing_and_force_pushing: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    Open,
    #[default]
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FallbackBehavior {
    #[serde(default)]
    pub fail: FailMode,
}

/// Allow-lists that short-circuit enforcement entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BypassSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_tokens: Vec<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<u64>,
    /// Protected branches exempt from approval requirements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,
}
