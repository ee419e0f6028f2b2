//! `any_merge_request` rules: gate on the merge request itself rather than
//! scan results.

use super::{branch_matches, RuleOutcome};
use crate::model::EvaluationContext;
use approvalguard_types::{ids, AnyMergeRequestRule, CommitFilter};
use serde_json::json;

pub(super) fn evaluate(rule: &AnyMergeRequestRule, ctx: &EvaluationContext<'_>) -> RuleOutcome {
    if !branch_matches(&rule.branches, &ctx.merge_request.target_branch) {
        return RuleOutcome::no_match();
    }

    match rule.commits {
        CommitFilter::Any => {
            if ctx.merge_request.commits.is_empty() {
                RuleOutcome::no_match()
            } else {
                RuleOutcome::matched(json!({ ids::KEY_COMMITS: true }))
            }
        }
        CommitFilter::Unsigned => {
            let mut unsigned: Vec<&str> = ctx
                .merge_request
                .commits
                .iter()
                .filter(|c| !c.signed)
                .map(|c| c.sha.as_str())
                .collect();
            unsigned.sort_unstable();

            if unsigned.is_empty() {
                RuleOutcome::no_match()
            } else {
                RuleOutcome::matched(json!({ ids::KEY_COMMITS: unsigned }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MergeRequestRef, ScanSnapshot};
    use approvalguard_types::CommitInfo;
    use serde_json::json;
    use time::OffsetDateTime;

    fn commit(sha: &str, signed: bool) -> CommitInfo {
        CommitInfo {
            sha: sha.to_string(),
            signed,
            author_email: None,
        }
    }

    fn merge_request(commits: Vec<CommitInfo>) -> MergeRequestRef {
        MergeRequestRef {
            id: 1,
            project_id: 1,
            source_branch: "feature".to_string(),
            target_branch: "main".to_string(),
            commits,
        }
    }

    fn rule(commits: CommitFilter) -> AnyMergeRequestRule {
        AnyMergeRequestRule {
            branches: Vec::new(),
            commits,
        }
    }

    fn evaluate_with(rule: &AnyMergeRequestRule, commits: Vec<CommitInfo>) -> RuleOutcome {
        let mr = merge_request(commits);
        let snapshot = ScanSnapshot::default();
        let ctx = EvaluationContext::new(&mr, &snapshot, OffsetDateTime::UNIX_EPOCH);
        evaluate(rule, &ctx)
    }

    #[test]
    fn any_commits_matches_when_the_mr_has_commits() {
        let outcome = evaluate_with(&rule(CommitFilter::Any), vec![commit("a1", true)]);

        assert!(outcome.matched);
        assert_eq!(outcome.detail, Some(json!({ "commits": true })));
    }

    #[test]
    fn unsigned_filter_reports_only_unsigned_shas() {
        let outcome = evaluate_with(
            &rule(CommitFilter::Unsigned),
            vec![commit("a1", true), commit("b2", false)],
        );

        assert!(outcome.matched);
        assert_eq!(outcome.detail, Some(json!({ "commits": ["b2"] })));
    }

    #[test]
    fn unsigned_filter_passes_fully_signed_history() {
        let outcome = evaluate_with(&rule(CommitFilter::Unsigned), vec![commit("a1", true)]);

        assert!(!outcome.matched);
    }
}
