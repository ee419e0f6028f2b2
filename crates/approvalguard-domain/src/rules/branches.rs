//! Branch pattern matching for rule scopes.

use globset::Glob;

/// A rule with an empty branch list matches every branch. Patterns are
/// globs (`release/*`); a pattern that fails to compile matches nothing —
/// parse-time validation already rejected it, this is a safety net.
pub fn branch_matches(patterns: &[String], branch: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    patterns.iter().any(|pattern| {
        Glob::new(pattern)
            .map(|g| g.compile_matcher().is_match(branch))
            .unwrap_or(false)
    })
}
