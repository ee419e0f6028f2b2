//! Stable identifiers for rule types and violation error codes.
//!
//! Rule type names double as keys inside `violation_data.violations`.
//! Error codes are SCREAMING_SNAKE_CASE and stable across releases.

// Rule types
pub const RULE_SCAN_FINDING: &str = "scan_finding";
pub const RULE_LICENSE_FINDING: &str = "license_finding";
pub const RULE_ANY_MERGE_REQUEST: &str = "any_merge_request";
pub const RULE_NO_LONGER_DETECTED: &str = "no_longer_detected";

// Evaluation-level error codes recorded under `violation_data.errors`
pub const ERROR_SCAN_REMOVED: &str = "SCAN_REMOVED";
pub const ERROR_ARTIFACTS_MISSING: &str = "ARTIFACTS_MISSING";
pub const ERROR_EVALUATION_SKIPPED: &str = "EVALUATION_SKIPPED";
pub const ERROR_EVALUATION_TIMEOUT: &str = "EVALUATION_TIMEOUT";
pub const ERROR_RULE_CONTENT_INVALID: &str = "RULE_CONTENT_INVALID";

// Violation detail keys
pub const KEY_UUID: &str = "uuid";
pub const KEY_NEWLY_DETECTED: &str = "newly_detected";
pub const KEY_PREVIOUSLY_EXISTING: &str = "previously_existing";
pub const KEY_LICENSES: &str = "licenses";
pub const KEY_COMMITS: &str = "commits";
