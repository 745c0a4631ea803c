//! Error taxonomy for detection, remediation and fleet runs.
//!
//! - [`FleetError`] aborts a whole run (fleet-wide listing failed).
//! - [`DetectionError`] skips one repository.
//! - [`RemediationError`] fails one deviation and is recorded as an outcome.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Repository-scoped failure while evaluating policies.
#[derive(Debug, Clone, Error)]
pub enum DetectionError {
    #[error("policy '{policy}': invalid match pattern '{pattern}': {reason}")]
    InvalidPattern {
        policy: String,
        pattern: String,
        reason: String,
    },

    #[error("reading {path} in {repository}: {source}")]
    ReadWorkflow {
        repository: String,
        path: String,
        #[source]
        source: GatewayError,
    },

    #[error("fetching canonical content for policy '{policy}' from {url}: {source}")]
    FetchCanonical {
        policy: String,
        url: String,
        #[source]
        source: GatewayError,
    },
}

/// Step of the remediation state machine at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationStep {
    FetchCanonical,
    FindPullRequest,
    ReadBranchFile,
    ResolveBaseBranch,
    CreateBranch,
    VerifyBranch,
    WriteFile,
    OpenPullRequest,
}

impl std::fmt::Display for RemediationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RemediationStep::FetchCanonical => "fetching canonical content",
            RemediationStep::FindPullRequest => "finding existing pull request",
            RemediationStep::ReadBranchFile => "reading file on branch",
            RemediationStep::ResolveBaseBranch => "resolving base branch",
            RemediationStep::CreateBranch => "creating branch",
            RemediationStep::VerifyBranch => "verifying branch",
            RemediationStep::WriteFile => "writing file",
            RemediationStep::OpenPullRequest => "opening pull request",
        };
        f.write_str(s)
    }
}

/// Deviation-scoped failure, self-describing without a stack trace.
#[derive(Debug, Clone, Error)]
#[error("{step} ({repository}, branch {branch}): {source}")]
pub struct RemediationError {
    pub step: RemediationStep,
    pub repository: String,
    pub branch: String,
    #[source]
    pub source: GatewayError,
}

/// Run-level failure; the only kind that aborts a fleet run.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("listing repositories: {0}")]
    ListRepositories(#[source] GatewayError),
}

/// Result alias for detection.
pub type DetectionResult<T> = std::result::Result<T, DetectionError>;

/// Result alias for remediation.
pub type RemediationResult<T> = std::result::Result<T, RemediationError>;

/// Result alias for fleet runs.
pub type FleetResult<T> = std::result::Result<T, FleetError>;
