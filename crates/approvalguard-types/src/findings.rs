//! Normalized scan inputs consumed by rule evaluation.
//!
//! These are the shapes the scan-ingestion pipeline hands over: the engine
//! never talks to scanners directly.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindingSeverity {
    Info,
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

/// Workflow state of a vulnerability finding.
///
/// The `New*` states describe findings introduced by the merge request under
/// evaluation; the remaining states describe findings already present on the
/// target branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityState {
    NewNeedsTriage,
    NewDismissed,
    Detected,
    Confirmed,
    Dismissed,
    Resolved,
}

impl VulnerabilityState {
    /// States describing findings newly introduced by the merge request.
    pub fn is_new(self) -> bool {
        matches!(self, Self::NewNeedsTriage | Self::NewDismissed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScanFinding {
    pub uuid: String,
    /// Scanner identifier, e.g. `sast`, `container_scanning`.
    pub scanner: String,
    pub severity: FindingSeverity,
    pub state: VulnerabilityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[schemars(with = "Option<String>")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub detected_at: Option<OffsetDateTime>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LicenseState {
    /// Introduced by the merge request under evaluation.
    NewlyDetected,
    /// Already present on the target branch.
    Detected,
}

/// One dependency license resolved from the dependency scan.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseOccurrence {
    /// Resolved SPDX license name, e.g. `MIT License`.
    pub license: String,
    /// Package URL of the dependency carrying the license.
    pub purl: String,
    pub state: LicenseState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommitInfo {
    pub sha: String,
    /// Whether the commit carries a valid signature.
    pub signed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
}
