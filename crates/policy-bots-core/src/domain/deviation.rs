//! Deviations: detected gaps between a policy and a repository.

use serde::{Deserialize, Serialize};

use super::policy::Policy;
use super::repository::Repository;

/// What the remediation must do to the managed workflow file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationAction {
    /// The workflow file does not exist yet.
    Create,
    /// The workflow file exists but differs from the wrapped canonical content.
    Update,
}

impl DeviationAction {
    /// Verb used in commit messages and pull request titles.
    pub fn verb(self) -> &'static str {
        match self {
            DeviationAction::Create => "add",
            DeviationAction::Update => "update",
        }
    }
}

impl std::fmt::Display for DeviationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviationAction::Create => write!(f, "create"),
            DeviationAction::Update => write!(f, "update"),
        }
    }
}

/// A mismatch between the required and the actual state of one policy-managed
/// file in one repository.
///
/// The wrapped expected content is deliberately not stored here; remediation
/// re-fetches it so that it never acts on stale canonical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deviation {
    pub repository: Repository,
    pub policy: Policy,
    pub action: DeviationAction,
    /// Always `.github/workflows/<policy.name>.yml`.
    pub target_path: String,
    pub expected_source_url: String,
    /// Decoded content found in the repository; empty for [`DeviationAction::Create`].
    pub current_content: String,
}

impl Deviation {
    pub fn create(repository: Repository, policy: Policy) -> Self {
        Self {
            target_path: policy.target_path(),
            expected_source_url: policy.source_url.clone(),
            repository,
            policy,
            action: DeviationAction::Create,
            current_content: String::new(),
        }
    }

    pub fn update(repository: Repository, policy: Policy, current_content: String) -> Self {
        Self {
            target_path: policy.target_path(),
            expected_source_url: policy.source_url.clone(),
            repository,
            policy,
            action: DeviationAction::Update,
            current_content,
        }
    }

    /// Branch the remediation for this deviation is pushed to.
    pub fn branch_name(&self) -> String {
        self.policy.branch_name()
    }
}
