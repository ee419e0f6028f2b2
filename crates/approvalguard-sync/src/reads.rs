//! Denormalized per-project policy-rule projections.
//!
//! `ScanResultPolicyRead` rows exist so merge-request approval computation
//! never re-walks configurations and scopes: one row per (configuration,
//! rule) pair per project the policy applies to, refreshed whenever a
//! policy is synced. Project links answer "which projects does this policy
//! touch" without re-scanning scope.

use approvalguard_domain::{applicable_policies_with_source, PolicyConfiguration, ProjectRef};
use approvalguard_policy::IdAllocator;
use approvalguard_types::{
    ActionSchema, ApprovalSettings, BypassSettings, FallbackBehavior, PolicyType, RuleSchema,
};

#[derive(Clone, Debug, PartialEq)]
pub struct ScanResultPolicyRead {
    pub id: u64,
    pub configuration_id: u64,
    pub project_id: u64,
    pub policy_index: i32,
    pub rule_index: i32,
    pub policy_name: String,
    pub policy_type: PolicyType,
    pub rule: RuleSchema,
    pub actions: Vec<ActionSchema>,
    pub approval_settings: ApprovalSettings,
    pub fallback_behavior: FallbackBehavior,
    pub bypass_settings: Option<BypassSettings>,
    pub send_bot_message: bool,
    pub custom_roles: Vec<String>,
}

impl ScanResultPolicyRead {
    pub fn remove_approvals_with_new_commit(&self) -> bool {
        self.approval_settings
            .remove_approvals_with_new_commit
            .unwrap_or(false)
    }

    /// Reassemble a policy document carrying just what rule evaluation
    /// needs. Scope is deliberately absent; reads are already scoped.
    pub fn to_policy_document(&self) -> approvalguard_types::PolicyDocument {
        approvalguard_types::PolicyDocument {
            policy_type: self.policy_type,
            name: self.policy_name.clone(),
            description: None,
            enabled: true,
            policy_scope: None,
            rules: Vec::new(),
            actions: self.actions.clone(),
            approval_settings: Some(self.approval_settings.clone()),
            fallback_behavior: Some(self.fallback_behavior),
            bypass_settings: self.bypass_settings.clone(),
            metadata: None,
        }
    }
}

/// Association row: which projects a policy is currently materialized onto.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyProjectLink {
    pub configuration_id: u64,
    pub policy_index: i32,
    pub project_id: u64,
}

/// Rebuild the reads and links for one project from its configuration
/// chain. Callers replace any previous rows wholesale.
pub fn refresh_policy_reads(
    project: &ProjectRef,
    configurations: &[PolicyConfiguration],
    ids: &mut IdAllocator,
) -> (Vec<ScanResultPolicyRead>, Vec<PolicyProjectLink>) {
    let mut reads = Vec::new();
    let mut links = Vec::new();

    for (configuration, policy) in applicable_policies_with_source(project, configurations) {
        // Only approval policies gate merges; execution policies never
        // materialize reads.
        if policy.policy_type != PolicyType::ApprovalPolicy {
            continue;
        }
        let policy_index = configuration
            .policies
            .iter()
            .position(|p| std::ptr::eq(p, policy))
            .unwrap_or(0) as i32;

        links.push(PolicyProjectLink {
            configuration_id: configuration.id,
            policy_index,
            project_id: project.id,
        });

        let send_bot_message = policy
            .actions
            .iter()
            .any(|a| matches!(a, ActionSchema::SendBotMessage { enabled: true }));
        let custom_roles: Vec<String> = policy
            .actions
            .iter()
            .filter_map(|a| match a {
                ActionSchema::RequireApproval(action) => Some(action.role_approvers.clone()),
                _ => None,
            })
            .flatten()
            .collect();

        for (rule_index, rule) in policy.rules.iter().enumerate() {
            reads.push(ScanResultPolicyRead {
                id: ids.next(),
                configuration_id: configuration.id,
                project_id: project.id,
                policy_index,
                rule_index: rule_index as i32,
                policy_name: policy.name.clone(),
                policy_type: policy.policy_type,
                rule: rule.clone(),
                actions: policy.actions.clone(),
                approval_settings: policy.approval_settings.clone().unwrap_or_default(),
                fallback_behavior: policy.fallback_behavior.unwrap_or_default(),
                bypass_settings: policy.bypass_settings.clone(),
                send_bot_message,
                custom_roles: custom_roles.clone(),
            });
        }
    }

    (reads, links)
}
