//! Structured violation data persisted per (merge request, policy) pair.
//!
//! Shape:
//!
//! ```json
//! {
//!   "violations": { "scan_finding": { "uuid": { "newly_detected": ["..."] } } },
//!   "errors": [ { "error": "SCAN_REMOVED", "missing_scans": ["sast"] } ],
//!   "context": { "pipeline_ids": [1] }
//! }
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Lifecycle status of one violation row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    /// Evaluation has not completed yet. Blocks merging like a violation.
    Running,
    Failed,
    /// A would-be failure downgraded because the policy fails open.
    Warn,
    /// Evaluation was deliberately skipped for this policy.
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViolationError {
    /// Stable error code, e.g. `SCAN_REMOVED`.
    pub error: String,
    /// Error-specific detail, flattened alongside the code.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, JsonValue>,
}

impl ViolationError {
    pub fn new(code: &str) -> Self {
        Self {
            error: code.to_string(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_extra(code: &str, extra: serde_json::Map<String, JsonValue>) -> Self {
        Self {
            error: code.to_string(),
            extra,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ViolationData {
    /// Per rule-type violation detail, keyed by rule type name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub violations: BTreeMap<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ViolationError>,
    /// Evaluation context, e.g. which pipelines were inspected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,
}

impl ViolationData {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty() && self.errors.is_empty() && self.context.is_none()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Errors other than the deliberate-skip marker.
    pub fn has_hard_errors(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.error != crate::ids::ERROR_EVALUATION_SKIPPED)
    }

    /// Merge rule detail for `rule_type` into existing data. Later values win
    /// per key; objects are merged recursively so `newly_detected` and
    /// `previously_existing` coexist under `uuid`.
    pub fn merge_rule_data(&mut self, rule_type: &str, data: JsonValue) {
        match self.violations.get_mut(rule_type) {
            Some(existing) => deep_merge(existing, data),
            None => {
                self.violations.insert(rule_type.to_string(), data);
            }
        }
    }

    pub fn add_error(&mut self, error: ViolationError) {
        if !self.errors.iter().any(|e| *e == error) {
            self.errors.push(error);
        }
    }

    pub fn set_context(&mut self, context: JsonValue) {
        self.context = Some(context);
    }
}

fn deep_merge(target: &mut JsonValue, incoming: JsonValue) {
    match (target, incoming) {
        (JsonValue::Object(t), JsonValue::Object(s)) => {
            for (k, v) in s {
                match t.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        t.insert(k, v);
                    }
                }
            }
        }
        (t, s) => *t = s,
    }
}
