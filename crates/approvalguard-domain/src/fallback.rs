//! Fail-open / fail-closed fallback and bypass allow-list resolution.
//!
//! Resolution order: bypass allow-lists first (they short-circuit
//! enforcement regardless of the evaluation result), then the evaluation
//! result itself, then the fallback mode for errored evaluations.

use crate::rules::EvaluationError;
use approvalguard_types::{BypassSettings, FailMode};

/// Who is asking for the merge to proceed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BypassActor {
    pub access_token_id: Option<u64>,
    pub service_account_id: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnforcementReason {
    NoViolation,
    ViolationFound,
    /// Evaluation errored and the policy fails closed.
    FallbackClosed,
    /// Evaluation errored and the policy fails open.
    FallbackOpen,
    BypassAccessToken,
    BypassServiceAccount,
    BranchException,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnforcementDecision {
    pub enforce: bool,
    pub reason: EnforcementReason,
}

/// Resolve the final enforcement decision for one policy.
pub fn resolve_enforcement(
    evaluation: Result<bool, &EvaluationError>,
    fallback: FailMode,
    bypass: Option<&BypassSettings>,
    actor: Option<&BypassActor>,
    target_branch: &str,
) -> EnforcementDecision {
    if let Some(bypass) = bypass {
        if let Some(actor) = actor {
            if let Some(token) = actor.access_token_id
                && bypass.access_tokens.contains(&token)
            {
                return EnforcementDecision {
                    enforce: false,
                    reason: EnforcementReason::BypassAccessToken,
                };
            }
            if let Some(account) = actor.service_account_id
                && bypass.service_accounts.contains(&account)
            {
                return EnforcementDecision {
                    enforce: false,
                    reason: EnforcementReason::BypassServiceAccount,
                };
            }
        }
        if bypass.branches.iter().any(|b| b == target_branch) {
            return EnforcementDecision {
                enforce: false,
                reason: EnforcementReason::BranchException,
            };
        }
    }

    match evaluation {
        Ok(false) => EnforcementDecision {
            enforce: false,
            reason: EnforcementReason::NoViolation,
        },
        Ok(true) => EnforcementDecision {
            enforce: true,
            reason: EnforcementReason::ViolationFound,
        },
        Err(_) => match fallback {
            FailMode::Open => EnforcementDecision {
                enforce: false,
                reason: EnforcementReason::FallbackOpen,
            },
            FailMode::Closed => EnforcementDecision {
                enforce: true,
                reason: EnforcementReason::FallbackClosed,
            },
        },
    }
}
