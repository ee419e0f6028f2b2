//! Content checksums for change detection.
//!
//! The checksum is SHA-256 over canonical JSON of the document. serde_json
//! maps are ordered, so two documents with the same content always hash the
//! same regardless of YAML key order.

use approvalguard_types::{PolicyDocument, RuleSchema};
use sha2::{Digest, Sha256};

pub fn policy_checksum(document: &PolicyDocument) -> String {
    let canonical =
        serde_json::to_value(document).expect("policy documents always serialize to JSON");
    hash_json(&canonical)
}

pub fn rule_checksum(rule: &RuleSchema) -> String {
    let canonical = serde_json::to_value(rule).expect("rule content always serializes to JSON");
    hash_json(&canonical)
}

fn hash_json(value: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
