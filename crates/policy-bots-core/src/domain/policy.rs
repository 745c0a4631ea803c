//! Workflow policy definitions.

use serde::{Deserialize, Serialize};

/// Directory in which policy-managed workflow files live.
pub const WORKFLOWS_DIR: &str = ".github/workflows";

/// Prefix of every branch the bot pushes remediation commits to.
pub const BRANCH_PREFIX: &str = "chore/";

/// A declared workflow policy.
///
/// When any file of a repository matches `match_file`, the repository must
/// carry `.github/workflows/<name>.yml` with the wrapped content of `source`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Policy {
    /// Unique policy name; used to derive the target path and branch name.
    pub name: String,
    /// Recursive glob tested against repository file paths.
    #[serde(rename = "match_file")]
    pub match_pattern: String,
    /// URL serving the canonical workflow content.
    #[serde(rename = "source")]
    pub source_url: String,
}

impl Policy {
    pub fn new(
        name: impl Into<String>,
        match_pattern: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            match_pattern: match_pattern.into(),
            source_url: source_url.into(),
        }
    }

    /// Path of the managed workflow file, e.g. `.github/workflows/dockerfile.yml`.
    pub fn target_path(&self) -> String {
        format!("{WORKFLOWS_DIR}/{}.yml", self.name)
    }

    /// Remediation branch, a pure function of the policy name.
    pub fn branch_name(&self) -> String {
        format!("{BRANCH_PREFIX}{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_path_and_branch_are_derived_from_name() {
        let policy = Policy::new("dockerfile", "**/Dockerfile*", "https://example.com/d.yml");
        assert_eq!(policy.target_path(), ".github/workflows/dockerfile.yml");
        assert_eq!(policy.branch_name(), "chore/dockerfile");
    }

    #[test]
    fn test_serde_uses_catalog_field_names() {
        let json = r#"{"name":"go","match_file":"**/go.mod","source":"https://example.com/go.yml"}"#;
        let policy: Policy = serde_json::from_str(json).expect("deserialize");
        assert_eq!(policy.match_pattern, "**/go.mod");
        assert_eq!(policy.source_url, "https://example.com/go.yml");

        let back = serde_json::to_value(&policy).expect("serialize");
        assert_eq!(back["match_file"], "**/go.mod");
    }
}
