//! Terminal results of remediating one deviation.

use serde::{Deserialize, Serialize};

use super::deviation::Deviation;

/// What the remediation engine did for a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    /// A new branch, commit and pull request were created.
    Created,
    /// An existing pull request's branch was amended.
    Updated,
    /// An existing pull request already carries the expected content.
    Skipped,
    /// Remediation aborted; see [`RemediationOutcome::error`].
    Failed,
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemediationAction::Created => "created",
            RemediationAction::Updated => "updated",
            RemediationAction::Skipped => "skipped",
            RemediationAction::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One outcome per deviation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationOutcome {
    pub deviation: Deviation,
    pub action: RemediationAction,
    pub pull_request_url: Option<String>,
    pub error: Option<String>,
}

impl RemediationOutcome {
    pub fn created(deviation: Deviation, pull_request_url: String) -> Self {
        Self::succeeded(deviation, RemediationAction::Created, pull_request_url)
    }

    pub fn updated(deviation: Deviation, pull_request_url: String) -> Self {
        Self::succeeded(deviation, RemediationAction::Updated, pull_request_url)
    }

    pub fn skipped(deviation: Deviation, pull_request_url: String) -> Self {
        Self::succeeded(deviation, RemediationAction::Skipped, pull_request_url)
    }

    /// Record a deviation-scoped failure as data rather than as an error.
    pub fn failed(deviation: Deviation, error: &dyn std::fmt::Display) -> Self {
        Self {
            deviation,
            action: RemediationAction::Failed,
            pull_request_url: None,
            error: Some(error.to_string()),
        }
    }

    fn succeeded(deviation: Deviation, action: RemediationAction, url: String) -> Self {
        Self {
            deviation,
            action,
            pull_request_url: Some(url),
            error: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.action == RemediationAction::Failed
    }
}
