//! JSON input shapes accepted on the command line.
//!
//! These mirror the domain model but carry serde defaults so callers can
//! omit fields they do not have.

use approvalguard_domain::{MergeRequestRef, ScanSnapshot};
use approvalguard_types::{CommitInfo, LicenseOccurrence, ScanFinding};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct MergeRequestInput {
    pub id: u64,
    #[serde(default)]
    pub project_id: u64,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub commits: Vec<CommitInfo>,
}

impl From<MergeRequestInput> for MergeRequestRef {
    fn from(input: MergeRequestInput) -> Self {
        MergeRequestRef {
            id: input.id,
            project_id: input.project_id,
            source_branch: input.source_branch,
            target_branch: input.target_branch,
            commits: input.commits,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SnapshotInput {
    /// Absent means the pipeline scan has not completed.
    #[serde(default)]
    pub pipeline_findings: Option<Vec<ScanFinding>>,
    #[serde(default)]
    pub target_findings: Vec<ScanFinding>,
    #[serde(default)]
    pub running_scanners: Vec<String>,
    #[serde(default)]
    pub licenses: Vec<LicenseOccurrence>,
}

impl From<SnapshotInput> for ScanSnapshot {
    fn from(input: SnapshotInput) -> Self {
        ScanSnapshot {
            pipeline_findings: input.pipeline_findings,
            target_findings: input.target_findings,
            running_scanners: input.running_scanners,
            licenses: input.licenses,
        }
    }
}
