//! Recursive glob matching of repository file paths.
//!
//! `**` matches any number of path segments (including none), `*` and `?`
//! never cross a `/`.

use glob::{MatchOptions, Pattern, PatternError};

const OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile a policy match pattern.
pub fn compile(pattern: &str) -> Result<Pattern, PatternError> {
    Pattern::new(pattern)
}

/// Whether `path` matches the compiled pattern.
pub fn matches(pattern: &Pattern, path: &str) -> bool {
    pattern.matches_with(path, OPTIONS)
}

/// Whether at least one of `files` matches. Existence, not count.
pub fn matches_any<S: AsRef<str>>(pattern: &Pattern, files: &[S]) -> bool {
    files.iter().any(|f| matches(pattern, f.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, path: &str) -> bool {
        matches(&compile(pattern).expect("valid pattern"), path)
    }

    #[test]
    fn test_double_star_matches_root_and_nested() {
        assert!(m("**/Dockerfile*", "Dockerfile"));
        assert!(m("**/Dockerfile*", "services/api/Dockerfile.prod"));
        assert!(!m("**/Dockerfile*", "docs/dockerfile.md"));
    }

    #[test]
    fn test_single_star_stays_within_segment() {
        assert!(m("*.go", "main.go"));
        assert!(!m("*.go", "cmd/main.go"));
        assert!(m("cmd/*/main.go", "cmd/bot/main.go"));
    }

    #[test]
    fn test_malformed_pattern_is_rejected() {
        assert!(compile("[abc").is_err());
        assert!(compile("a**b").is_err());
    }

    #[test]
    fn test_matches_any_is_existence() {
        let pattern = compile("**/go.mod").expect("valid");
        assert!(matches_any(&pattern, &["a/go.mod", "b/go.mod"]));
        assert!(!matches_any::<&str>(&pattern, &[]));
    }
}
