//! Policy catalog: the ordered, validated set of workflow policies.
//!
//! Loaded once at startup. Malformed records fail the load, never a run.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::domain::Policy;
use crate::pattern;

/// Errors raised while loading a policy catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid policy catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read policy catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("policy #{index}: field '{field}' must not be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error(
        "policy name '{name}' may only contain ASCII letters, digits, '.', '_' and '-', \
         and must form a valid branch name"
    )]
    InvalidName { name: String },

    #[error("duplicate policy name '{name}'")]
    DuplicateName { name: String },

    #[error("policy '{name}': invalid match pattern '{pattern}': {reason}")]
    InvalidPattern {
        name: String,
        pattern: String,
        reason: String,
    },

    #[error("policy '{name}': source '{source_url}' is not an http(s) URL")]
    InvalidSource { name: String, source_url: String },
}

/// Ordered list of policies with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PolicyCatalog {
    policies: Vec<Policy>,
}

impl PolicyCatalog {
    /// Validate and wrap `policies`, preserving their order.
    pub fn new(policies: Vec<Policy>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for (index, policy) in policies.iter().enumerate() {
            validate(index, policy)?;
            if !seen.insert(policy.name.as_str()) {
                return Err(CatalogError::DuplicateName {
                    name: policy.name.clone(),
                });
            }
        }
        Ok(Self { policies })
    }

    /// Parse the catalog JSON format: `[{"name", "match_file", "source"}]`.
    pub fn from_json(data: &[u8]) -> Result<Self, CatalogError> {
        let policies: Vec<Policy> = serde_json::from_slice(data)?;
        Self::new(policies)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let data = std::fs::read(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&data)
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Policy> {
        self.policies.iter()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

impl<'a> IntoIterator for &'a PolicyCatalog {
    type Item = &'a Policy;
    type IntoIter = std::slice::Iter<'a, Policy>;

    fn into_iter(self) -> Self::IntoIter {
        self.policies.iter()
    }
}

fn validate(index: usize, policy: &Policy) -> Result<(), CatalogError> {
    for (field, value) in [
        ("name", &policy.name),
        ("match_file", &policy.match_pattern),
        ("source", &policy.source_url),
    ] {
        if value.trim().is_empty() {
            return Err(CatalogError::EmptyField { index, field });
        }
    }

    let name_ok = policy
        .name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !name_ok || !is_ref_safe(&policy.name) {
        return Err(CatalogError::InvalidName {
            name: policy.name.clone(),
        });
    }

    pattern::compile(&policy.match_pattern).map_err(|e| CatalogError::InvalidPattern {
        name: policy.name.clone(),
        pattern: policy.match_pattern.clone(),
        reason: e.to_string(),
    })?;

    let source_ok = url::Url::parse(&policy.source_url)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !source_ok {
        return Err(CatalogError::InvalidSource {
            name: policy.name.clone(),
            source_url: policy.source_url.clone(),
        });
    }

    Ok(())
}

/// Rules `git check-ref-format` applies to a single ref component.
fn is_ref_safe(name: &str) -> bool {
    !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && !name.ends_with(".lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"[
        {"name": "dockerfile", "match_file": "**/Dockerfile*", "source": "https://example.com/dockerfile.yml"},
        {"name": "go", "match_file": "**/go.mod", "source": "https://example.com/go.yml"}
    ]"#;

    #[test]
    fn test_from_json_preserves_order() {
        let catalog = PolicyCatalog::from_json(CATALOG.as_bytes()).expect("valid catalog");
        let names: Vec<&str> = catalog.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["dockerfile", "go"]);
        assert_eq!(catalog.get("go").map(|p| p.match_pattern.as_str()), Some("**/go.mod"));
    }

    #[test]
    fn test_empty_catalog_is_valid() {
        let catalog = PolicyCatalog::from_json(b"[]").expect("empty catalog");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_malformed_json_fails() {
        let err = PolicyCatalog::from_json(b"{not json").unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    #[test]
    fn test_duplicate_names_fail() {
        let err = PolicyCatalog::new(vec![
            Policy::new("go", "**/go.mod", "https://example.com/a.yml"),
            Policy::new("go", "**/*.go", "https://example.com/b.yml"),
        ])
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateName { name } if name == "go"));
    }

    #[test]
    fn test_invalid_pattern_fails_at_load() {
        let err = PolicyCatalog::new(vec![Policy::new("go", "abc[def", "https://example.com/a.yml")])
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPattern { .. }));
    }

    #[test]
    fn test_unsafe_name_fails() {
        let err = PolicyCatalog::new(vec![Policy::new("../x", "*", "https://example.com/a.yml")])
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidName { .. }));
    }

    #[test]
    fn test_names_that_make_invalid_branches_fail() {
        for name in ["a..b", "x.lock", "go.", ".hidden"] {
            let err = PolicyCatalog::new(vec![Policy::new(name, "*", "https://example.com/a.yml")])
                .unwrap_err();
            assert!(
                matches!(err, CatalogError::InvalidName { .. }),
                "{name} should be rejected"
            );
        }
        let ok = PolicyCatalog::new(vec![Policy::new("go.v2", "*", "https://example.com/a.yml")]);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_non_http_source_fails() {
        let err = PolicyCatalog::new(vec![Policy::new("go", "*", "file:///etc/passwd")]).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidSource { .. }));
    }

    #[test]
    fn test_empty_field_fails() {
        let err = PolicyCatalog::new(vec![Policy::new("go", " ", "https://example.com/a.yml")])
            .unwrap_err();
        assert!(matches!(err, CatalogError::EmptyField { field: "match_file", .. }));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(CATALOG.as_bytes()).expect("write");
        let catalog = PolicyCatalog::from_file(file.path()).expect("load");
        assert_eq!(catalog.len(), 2);
    }
}
