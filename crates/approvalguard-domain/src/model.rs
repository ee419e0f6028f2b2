//! Input model for one evaluation run.

use approvalguard_types::{CommitInfo, LicenseOccurrence, ScanFinding};
use std::collections::BTreeMap;
use time::OffsetDateTime;

#[derive(Clone, Debug, Default)]
pub struct ProjectRef {
    pub id: u64,
    pub compliance_framework_ids: Vec<u64>,
    /// Ancestor group ids, closest ancestor first.
    pub group_ancestry: Vec<u64>,
}

#[derive(Clone, Debug)]
pub struct MergeRequestRef {
    pub id: u64,
    pub project_id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub commits: Vec<CommitInfo>,
}

/// Scan state the rule evaluator reads. Produced by the scan-ingestion
/// pipeline; the engine never talks to scanners directly.
#[derive(Clone, Debug, Default)]
pub struct ScanSnapshot {
    /// Findings from the merge request's head pipeline. `None` means the
    /// scan report has not arrived yet (distinct from an empty report).
    pub pipeline_findings: Option<Vec<ScanFinding>>,
    /// Findings currently known on the target branch.
    pub target_findings: Vec<ScanFinding>,
    /// Scanner identifiers that actually ran in the head pipeline.
    pub running_scanners: Vec<String>,
    pub licenses: Vec<LicenseOccurrence>,
}

/// Per-run lookup of license name -> occurrences. Built once per evaluation
/// and passed around explicitly; there is no process-wide memoization.
#[derive(Clone, Debug, Default)]
pub struct LicenseIndex {
    by_license: BTreeMap<String, Vec<LicenseOccurrence>>,
}

impl LicenseIndex {
    pub fn build(occurrences: &[LicenseOccurrence]) -> Self {
        let mut by_license: BTreeMap<String, Vec<LicenseOccurrence>> = BTreeMap::new();
        for occurrence in occurrences {
            by_license
                .entry(occurrence.license.to_ascii_lowercase())
                .or_default()
                .push(occurrence.clone());
        }
        Self { by_license }
    }

    pub fn occurrences_of(&self, license: &str) -> &[LicenseOccurrence] {
        self.by_license
            .get(&license.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn licenses(&self) -> impl Iterator<Item = (&str, &[LicenseOccurrence])> {
        self.by_license
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

#[derive(Clone, Debug)]
pub struct EvaluationContext<'a> {
    pub merge_request: &'a MergeRequestRef,
    pub snapshot: &'a ScanSnapshot,
    pub license_index: LicenseIndex,
    pub now: OffsetDateTime,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        merge_request: &'a MergeRequestRef,
        snapshot: &'a ScanSnapshot,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            merge_request,
            snapshot,
            license_index: LicenseIndex::build(&snapshot.licenses),
            now,
        }
    }
}
