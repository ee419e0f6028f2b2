//! Stable DTOs and IDs used across the approvalguard workspace.
//!
//! This crate is intentionally boring:
//! - the policy document schema as it appears on disk (YAML)
//! - normalized scan inputs (findings, license occurrences, commits)
//! - violation data shapes and statuses
//! - the evaluation report envelope
//! - stable string IDs and error codes

#![forbid(unsafe_code)]

pub mod approvers;
pub mod findings;
pub mod ids;
pub mod policy;
pub mod report;
pub mod violation;

pub use approvers::ApproverSet;
pub use findings::{
    CommitInfo, FindingSeverity, LicenseOccurrence, LicenseState, ScanFinding, VulnerabilityState,
};
pub use policy::{
    ActionSchema, AnyMergeRequestRule, ApprovalSettings, BypassSettings, CommitFilter, FailMode,
    FallbackBehavior, IdRef, LicenseCriteria, LicenseEntry, LicenseFindingRule,
    NoLongerDetectedRule, PackageExceptions, PipelineRule, PolicyDocument, PolicyScope, PolicyType,
    ProjectScope, PurlList, RequireApprovalAction, RuleSchema, ScanFindingRule, ScheduleRule,
    VulnerabilityAge,
};
pub use report::{
    DecisionStatus, EvaluationReport, PolicyDecision, ToolMeta, SCHEMA_EVALUATION_REPORT_V1,
};
pub use violation::{ViolationData, ViolationError, ViolationStatus};
