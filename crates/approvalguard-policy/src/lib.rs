//! Policy document handling: YAML parsing, validation, content checksums,
//! and the persistence diff that keeps stored policies in sync with the
//! authored document.
//!
//! Evaluation itself lives in `approvalguard-domain`; this crate never looks
//! at scan data.

#![forbid(unsafe_code)]

pub mod checksum;
pub mod parse;
pub mod persist;

pub use checksum::{policy_checksum, rule_checksum};
pub use parse::{
    parse_policy_file, ParsedPolicies, PolicyFileEntryError, PolicyParseError, ValidationWarning,
};
pub use persist::{diff_policies, IdAllocator, PersistOutcome, PolicyRecord, PolicyRuleRecord};
