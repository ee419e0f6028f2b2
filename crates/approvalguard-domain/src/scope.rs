//! Scope resolution: which policies apply to which project.
//!
//! A policy scope can name compliance frameworks and project
//! include/exclude lists. Exclusion always wins. Group-level configurations
//! reach every descendant project unless the project carries its own
//! configuration with policies of the same type (closest wins) — except for
//! CSP-designated groups, whose policies cannot be overridden.

use crate::model::ProjectRef;
use approvalguard_types::{PolicyDocument, PolicyScope, PolicyType};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationSource {
    Project { project_id: u64 },
    Group { group_id: u64, csp: bool },
}

/// One security-orchestration configuration: a container (project or group)
/// plus the policies its management project declares.
#[derive(Clone, Debug)]
pub struct PolicyConfiguration {
    pub id: u64,
    pub source: ConfigurationSource,
    pub policies: Vec<PolicyDocument>,
}

impl PolicyConfiguration {
    fn reaches(&self, project: &ProjectRef) -> bool {
        match self.source {
            ConfigurationSource::Project { project_id } => project_id == project.id,
            ConfigurationSource::Group { group_id, .. } => {
                project.group_ancestry.contains(&group_id)
            }
        }
    }

    fn is_csp(&self) -> bool {
        matches!(self.source, ConfigurationSource::Group { csp: true, .. })
    }
}

/// Whether one policy's scope selects the project. Exclusion beats both
/// framework and inclusion-list membership.
pub fn applies_to(policy: &PolicyDocument, project: &ProjectRef) -> bool {
    let Some(scope) = &policy.policy_scope else {
        return true;
    };
    scope_selects(scope, project)
}

fn scope_selects(scope: &PolicyScope, project: &ProjectRef) -> bool {
    if let Some(projects) = &scope.projects
        && projects.excluding.iter().any(|p| p.id == project.id)
    {
        return false;
    }

    let has_framework_restriction = !scope.compliance_frameworks.is_empty();
    let has_inclusion_restriction = scope
        .projects
        .as_ref()
        .is_some_and(|p| !p.including.is_empty());

    if !has_framework_restriction && !has_inclusion_restriction {
        return true;
    }

    if has_framework_restriction
        && scope
            .compliance_frameworks
            .iter()
            .any(|f| project.compliance_framework_ids.contains(&f.id))
    {
        return true;
    }

    has_inclusion_restriction
        && scope
            .projects
            .as_ref()
            .is_some_and(|p| p.including.iter().any(|r| r.id == project.id))
}

/// Resolve the policies applicable to a project across its configuration
/// chain. Group configurations are consulted outermost-first, the project's
/// own configuration last; a project-level configuration overrides group
/// policies of the same type unless the group is CSP-designated.
pub fn applicable_policies<'a>(
    project: &ProjectRef,
    configurations: &'a [PolicyConfiguration],
) -> Vec<&'a PolicyDocument> {
    applicable_policies_with_source(project, configurations)
        .into_iter()
        .map(|(_, policy)| policy)
        .collect()
}

/// Like [`applicable_policies`], but keeps the owning configuration paired
/// with each selected policy. The synchronizer needs the pair to key its
/// denormalized policy reads.
pub fn applicable_policies_with_source<'a>(
    project: &ProjectRef,
    configurations: &'a [PolicyConfiguration],
) -> Vec<(&'a PolicyConfiguration, &'a PolicyDocument)> {
    let reaching: Vec<&PolicyConfiguration> = configurations
        .iter()
        .filter(|c| c.reaches(project))
        .collect();

    // Policy types the project's own configuration declares; these shadow
    // non-CSP group policies of the same type.
    let project_owned_types: Vec<PolicyType> = reaching
        .iter()
        .filter(|c| matches!(c.source, ConfigurationSource::Project { .. }))
        .flat_map(|c| c.policies.iter())
        .filter(|p| p.enabled)
        .map(|p| p.policy_type)
        .collect();

    let mut selected = Vec::new();
    for configuration in &reaching {
        let is_group = matches!(configuration.source, ConfigurationSource::Group { .. });
        for policy in &configuration.policies {
            if !policy.enabled || !applies_to(policy, project) {
                continue;
            }
            if is_group
                && !configuration.is_csp()
                && project_owned_types.contains(&policy.policy_type)
            {
                continue;
            }
            selected.push((*configuration, policy));
        }
    }
    selected
}
