//! Persistence diff between stored policies and a freshly authored document.
//!
//! Policies are soft-deleted by flipping `policy_index` negative; the pair
//! `(configuration_id, policy_index)` stays unique among non-deleted rows.
//! Content matching is checksum-first, name-second: a renamed policy is a
//! delete plus a create, a reorder only rewrites indexes, and rules dropped
//! from an updated policy are soft-deleted the same way.

use crate::checksum::{policy_checksum, rule_checksum};
use approvalguard_types::{PolicyDocument, PolicyType, RuleSchema};

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRecord {
    pub id: u64,
    pub configuration_id: u64,
    pub name: String,
    pub policy_type: PolicyType,
    /// Ordering key; negative marks a logically deleted policy.
    pub policy_index: i32,
    pub checksum: String,
    pub enabled: bool,
    pub document: PolicyDocument,
    pub rules: Vec<PolicyRuleRecord>,
}

impl PolicyRecord {
    pub fn is_deleted(&self) -> bool {
        self.policy_index < 0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRuleRecord {
    pub id: u64,
    pub policy_id: u64,
    /// Negative marks a dangling (soft-deleted) rule.
    pub rule_index: i32,
    pub checksum: String,
    pub rule: RuleSchema,
}

/// Hands out persistent row ids. The surrounding system owns real id
/// allocation; tests and the CLI use a counter.
#[derive(Clone, Debug)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator {
    pub fn starting_at(next: u64) -> Self {
        Self { next }
    }

    pub fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[derive(Debug, Default)]
pub struct PersistOutcome {
    /// Final state: active rows first (by index), then soft-deleted rows.
    pub policies: Vec<PolicyRecord>,
    pub created: Vec<u64>,
    pub updated: Vec<u64>,
    pub reordered: Vec<u64>,
    pub deleted: Vec<u64>,
    pub rules_deleted: Vec<u64>,
}

impl PersistOutcome {
    pub fn active_policies(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.policies.iter().filter(|p| !p.is_deleted())
    }

    pub fn has_changes(&self) -> bool {
        !self.created.is_empty()
            || !self.updated.is_empty()
            || !self.reordered.is_empty()
            || !self.deleted.is_empty()
    }
}

/// Reconcile stored policies with the incoming document list.
pub fn diff_policies(
    configuration_id: u64,
    existing: &[PolicyRecord],
    incoming: &[PolicyDocument],
    ids: &mut IdAllocator,
) -> PersistOutcome {
    let mut outcome = PersistOutcome::default();
    let incoming_checksums: Vec<String> = incoming.iter().map(policy_checksum).collect();

    // Pair each incoming document with an existing record: checksum match
    // first (unchanged content), then (name, type) match (updated content).
    let mut claimed: Vec<bool> = vec![false; existing.len()];
    let mut matches: Vec<Option<usize>> = vec![None; incoming.len()];

    for (i, checksum) in incoming_checksums.iter().enumerate() {
        if let Some(j) = existing
            .iter()
            .enumerate()
            .position(|(j, e)| !claimed[j] && !e.is_deleted() && e.checksum == *checksum)
        {
            claimed[j] = true;
            matches[i] = Some(j);
        }
    }
    for (i, document) in incoming.iter().enumerate() {
        if matches[i].is_some() {
            continue;
        }
        if let Some(j) = existing.iter().enumerate().position(|(j, e)| {
            !claimed[j]
                && !e.is_deleted()
                && e.name == document.name
                && e.policy_type == document.policy_type
        }) {
            claimed[j] = true;
            matches[i] = Some(j);
        }
    }

    for (i, document) in incoming.iter().enumerate() {
        let new_index = i as i32;
        match matches[i] {
            Some(j) => {
                let mut record = existing[j].clone();
                let content_changed = record.checksum != incoming_checksums[i];
                let moved = record.policy_index != new_index;
                record.policy_index = new_index;

                if content_changed {
                    record.checksum = incoming_checksums[i].clone();
                    record.enabled = document.enabled;
                    record.document = document.clone();
                    let (rules, deleted_rule_ids) =
                        diff_rules(record.id, &record.rules, &document.rules, ids);
                    record.rules = rules;
                    outcome.rules_deleted.extend(deleted_rule_ids);
                    outcome.updated.push(record.id);
                } else if moved {
                    outcome.reordered.push(record.id);
                }
                outcome.policies.push(record);
            }
            None => {
                let id = ids.next();
                let rules = document
                    .rules
                    .iter()
                    .enumerate()
                    .map(|(rule_index, rule)| PolicyRuleRecord {
                        id: ids.next(),
                        policy_id: id,
                        rule_index: rule_index as i32,
                        checksum: rule_checksum(rule),
                        rule: rule.clone(),
                    })
                    .collect();
                outcome.created.push(id);
                outcome.policies.push(PolicyRecord {
                    id,
                    configuration_id,
                    name: document.name.clone(),
                    policy_type: document.policy_type,
                    policy_index: new_index,
                    checksum: incoming_checksums[i].clone(),
                    enabled: document.enabled,
                    document: document.clone(),
                    rules,
                });
            }
        }
    }

    // Unmatched existing rows are soft-deleted: -1, -2, ... in stored order.
    let mut next_deleted_index = -1;
    for (j, record) in existing.iter().enumerate() {
        if claimed[j] {
            continue;
        }
        let mut record = record.clone();
        if !record.is_deleted() {
            record.policy_index = next_deleted_index;
            for (k, rule) in record.rules.iter_mut().enumerate() {
                if rule.rule_index >= 0 {
                    rule.rule_index = -(k as i32 + 1);
                }
            }
            outcome.deleted.push(record.id);
        }
        next_deleted_index -= 1;
        outcome.policies.push(record);
    }

    debug_assert!(unique_active_indexes(&outcome.policies));
    outcome
}

/// Reconcile a policy's stored rules with its updated rule list. Rules keep
/// their row when content is unchanged; dropped rules go negative.
fn diff_rules(
    policy_id: u64,
    existing: &[PolicyRuleRecord],
    incoming: &[RuleSchema],
    ids: &mut IdAllocator,
) -> (Vec<PolicyRuleRecord>, Vec<u64>) {
    let mut claimed: Vec<bool> = vec![false; existing.len()];
    let mut rules = Vec::with_capacity(incoming.len());
    let mut deleted = Vec::new();

    for (rule_index, rule) in incoming.iter().enumerate() {
        let checksum = rule_checksum(rule);
        let matched = existing
            .iter()
            .enumerate()
            .position(|(j, e)| !claimed[j] && e.rule_index >= 0 && e.checksum == checksum);
        match matched {
            Some(j) => {
                claimed[j] = true;
                let mut record = existing[j].clone();
                record.rule_index = rule_index as i32;
                rules.push(record);
            }
            None => rules.push(PolicyRuleRecord {
                id: ids.next(),
                policy_id,
                rule_index: rule_index as i32,
                checksum,
                rule: rule.clone(),
            }),
        }
    }

    let mut next_deleted_index = -1;
    for (j, record) in existing.iter().enumerate() {
        if claimed[j] {
            continue;
        }
        let mut record = record.clone();
        if record.rule_index >= 0 {
            record.rule_index = next_deleted_index;
            deleted.push(record.id);
        }
        next_deleted_index -= 1;
        rules.push(record);
    }

    (rules, deleted)
}

fn unique_active_indexes(policies: &[PolicyRecord]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    policies
        .iter()
        .filter(|p| !p.is_deleted())
        .all(|p| seen.insert((p.configuration_id, p.policy_index)))
}
