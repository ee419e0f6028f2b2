//! The evaluation report envelope emitted by the CLI and app layer.

use crate::approvers::ApproverSet;
use crate::policy::PolicyType;
use crate::violation::ViolationData;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const SCHEMA_EVALUATION_REPORT_V1: &str = "approvalguard.evaluation.v1";

/// Outcome of evaluating one policy against a merge request.
///
/// `Errored` is deliberately distinct from both `Passed` and `Violated` so
/// operators can tell enforcement gaps from genuine approvals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Passed,
    Violated,
    Errored,
    /// Scan data has not arrived yet; blocks like a violation.
    Unevaluated,
    /// A vulnerability-management rule matched: previously detected
    /// findings are gone and get auto-resolved. Never gates the merge.
    Resolved,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyDecision {
    pub policy_name: String,
    pub policy_type: PolicyType,
    pub status: DecisionStatus,
    /// Final enforcement after fallback and bypass resolution.
    pub enforce: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Whether a fail-open fallback suppressed enforcement.
    #[serde(default)]
    pub fallback_applied: bool,
    #[serde(default)]
    pub approvals_required: u32,
    #[serde(default, skip_serializing_if = "ApproverSet::is_empty")]
    pub approvers: ApproverSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violation: Option<ViolationData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ToolMeta {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationReport {
    /// Versioned schema identifier for the envelope shape.
    pub schema: String,
    pub tool: ToolMeta,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[schemars(with = "String")]
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    /// True when any decision enforces and blocks the merge request.
    pub blocked: bool,
    pub decisions: Vec<PolicyDecision>,
}
