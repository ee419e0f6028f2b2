//! Pure policy evaluation (no IO).
//!
//! Input: an evaluation context constructed elsewhere (merge request, scan
//! snapshot, project metadata). Output: per-rule outcomes plus enforcement
//! decisions after fallback and bypass resolution.

#![forbid(unsafe_code)]

pub mod fallback;
pub mod model;
pub mod scope;

pub mod rules;

pub use fallback::{resolve_enforcement, BypassActor, EnforcementDecision, EnforcementReason};
pub use model::{EvaluationContext, MergeRequestRef, ProjectRef, ScanSnapshot};
pub use rules::{evaluate_rule, EvaluationError, RuleOutcome};
pub use scope::{
    applicable_policies, applicable_policies_with_source, applies_to, ConfigurationSource,
    PolicyConfiguration,
};
