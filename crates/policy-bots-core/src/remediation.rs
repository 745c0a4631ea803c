//! Remediation engine: drive one deviation to an open pull request.
//!
//! ```text
//! START ─ fetch canonical ─ find open PR on chore/<policy>
//!   ├─ PR exists ──▶ UPDATE_BRANCH: compare branch file with wrapped content
//!   │                  equal ⇒ skipped, else write file ⇒ updated
//!   └─ no PR ──────▶ CREATE_BRANCH: resolve base (main, then master),
//!                      create branch (tolerating an existing one), verify it,
//!                      write file, open PR ⇒ created
//! ```
//!
//! The branch name depends on the policy name only, so repeated runs find the
//! branch and PR of earlier runs instead of opening duplicates.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::context::RunContext;
use crate::domain::{Deviation, RemediationOutcome};
use crate::error::{RemediationError, RemediationResult, RemediationStep};
use crate::gateway::{
    BranchRef, ContentFetcher, FileWrite, GatewayError, NewPullRequest, PullRequest,
    RepositoryGateway,
};
use crate::wrap::wrap_content;

/// Remediation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationConfig {
    /// Candidate base branches, tried in order.
    pub base_branches: Vec<String>,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            base_branches: vec!["main".to_string(), "master".to_string()],
        }
    }
}

/// Commit message for the managed file.
pub fn commit_message(deviation: &Deviation) -> String {
    format!(
        "chore(gha): {} {} workflow",
        deviation.action.verb(),
        deviation.policy.name
    )
}

/// Pull request title; identical to the commit subject.
pub fn pull_request_title(deviation: &Deviation) -> String {
    commit_message(deviation)
}

/// Pull request body documenting that the change is bot-authored.
pub fn pull_request_body(deviation: &Deviation) -> String {
    format!(
        "## Policy Bot Automated PR\n\
         \n\
         This PR was automatically created by the Policy Bot to ensure compliance.\n\
         \n\
         **Policy:** {}\n\
         **Action:** {}\n\
         **Target File:** {}\n\
         \n\
         ---\n\
         *This is an automated PR. Please review before merging.*\n",
        deviation.policy.name, deviation.action, deviation.target_path
    )
}

/// Drives the branch → file → pull request protocol for a deviation.
pub struct RemediationEngine {
    gateway: Arc<dyn RepositoryGateway>,
    fetcher: Arc<dyn ContentFetcher>,
    config: RemediationConfig,
}

impl RemediationEngine {
    pub fn new(gateway: Arc<dyn RepositoryGateway>, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self::with_config(gateway, fetcher, RemediationConfig::default())
    }

    pub fn with_config(
        gateway: Arc<dyn RepositoryGateway>,
        fetcher: Arc<dyn ContentFetcher>,
        config: RemediationConfig,
    ) -> Self {
        Self {
            gateway,
            fetcher,
            config,
        }
    }

    /// Remediate `deviation`, returning its terminal outcome.
    ///
    /// Any unhandled gateway failure aborts this deviation only and comes back
    /// as a [`RemediationError`] naming the step, repository and branch.
    #[instrument(skip(self, ctx, deviation), fields(
        repository = %deviation.repository.full_name,
        policy = %deviation.policy.name,
        action = %deviation.action,
    ))]
    pub async fn remediate(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
    ) -> RemediationResult<RemediationOutcome> {
        let branch = deviation.branch_name();

        // Always re-fetched: the detection pass may be long past.
        let canonical = self
            .fetcher
            .fetch(ctx, &deviation.expected_source_url)
            .await
            .map_err(fail(RemediationStep::FetchCanonical, deviation, &branch))?;
        let wrapped = wrap_content(&canonical, &deviation.policy.name);

        let existing = self
            .gateway
            .find_open_pull_request(ctx, &deviation.repository, &branch)
            .await
            .map_err(fail(RemediationStep::FindPullRequest, deviation, &branch))?;

        match existing {
            Some(pr) => self.update_branch(ctx, deviation, &branch, &wrapped, pr).await,
            None => self.create_branch(ctx, deviation, &branch, &wrapped).await,
        }
    }

    async fn update_branch(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
        branch: &str,
        wrapped: &str,
        pr: PullRequest,
    ) -> RemediationResult<RemediationOutcome> {
        let (current, sha) = self.read_branch_file(ctx, deviation, branch).await?;

        if current.as_deref() == Some(wrapped) {
            debug!(pull_request = %pr.html_url, "branch already carries expected content");
            return Ok(RemediationOutcome::skipped(deviation.clone(), pr.html_url));
        }

        self.write_file(ctx, deviation, branch, wrapped, sha).await?;
        info!(pull_request = %pr.html_url, "amended existing pull request");
        Ok(RemediationOutcome::updated(deviation.clone(), pr.html_url))
    }

    async fn create_branch(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
        branch: &str,
        wrapped: &str,
    ) -> RemediationResult<RemediationOutcome> {
        let repo = &deviation.repository;
        let base = self.resolve_base(ctx, deviation, branch).await?;

        if let Err(create_err) = self.gateway.create_branch(ctx, repo, branch, &base.sha).await {
            match create_err {
                GatewayError::AlreadyExists { .. } => {
                    debug!("branch already exists, reusing it");
                }
                create_err => {
                    // Another run (or a human) may have created it meanwhile.
                    if self.gateway.get_branch(ctx, repo, branch).await.is_err() {
                        return Err(fail(RemediationStep::CreateBranch, deviation, branch)(
                            create_err,
                        ));
                    }
                    debug!("branch creation failed but branch exists, continuing");
                }
            }
        }

        self.gateway
            .get_branch(ctx, repo, branch)
            .await
            .map_err(fail(RemediationStep::VerifyBranch, deviation, branch))?;

        let (current, sha) = self.read_branch_file(ctx, deviation, branch).await?;
        if current.as_deref() != Some(wrapped) {
            self.write_file(ctx, deviation, branch, wrapped, sha).await?;
        }

        let request = NewPullRequest {
            title: pull_request_title(deviation),
            body: pull_request_body(deviation),
            head: branch.to_string(),
            base: base.name,
        };
        let pr = self
            .gateway
            .create_pull_request(ctx, repo, &request)
            .await
            .map_err(fail(RemediationStep::OpenPullRequest, deviation, branch))?;

        info!(pull_request = %pr.html_url, "opened pull request");
        Ok(RemediationOutcome::created(deviation.clone(), pr.html_url))
    }

    /// First resolvable candidate base branch with a non-empty SHA.
    async fn resolve_base(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
        branch: &str,
    ) -> RemediationResult<BranchRef> {
        let mut last_err = GatewayError::not_found("no base branch candidates configured");
        for candidate in &self.config.base_branches {
            match self.gateway.get_branch(ctx, &deviation.repository, candidate).await {
                Ok(base) if !base.sha.is_empty() => return Ok(base),
                Ok(_) => {
                    last_err = GatewayError::Decode(format!("branch {candidate} has an empty SHA"));
                }
                Err(err @ GatewayError::Context(_)) => {
                    return Err(fail(RemediationStep::ResolveBaseBranch, deviation, branch)(err));
                }
                Err(err) => {
                    debug!(candidate = %candidate, error = %err, "base branch candidate unavailable");
                    last_err = err;
                }
            }
        }
        Err(fail(RemediationStep::ResolveBaseBranch, deviation, branch)(last_err))
    }

    /// Content and SHA of the target file on `branch`; a missing file is
    /// "not yet written", not an error.
    async fn read_branch_file(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
        branch: &str,
    ) -> RemediationResult<(Option<String>, Option<String>)> {
        match self
            .gateway
            .get_file(ctx, &deviation.repository, &deviation.target_path, Some(branch))
            .await
        {
            Ok(file) => Ok((Some(file.content), Some(file.sha))),
            Err(err) if err.is_not_found() => Ok((None, None)),
            Err(err) => Err(fail(RemediationStep::ReadBranchFile, deviation, branch)(err)),
        }
    }

    async fn write_file(
        &self,
        ctx: &RunContext,
        deviation: &Deviation,
        branch: &str,
        wrapped: &str,
        sha: Option<String>,
    ) -> RemediationResult<()> {
        let write = FileWrite {
            path: deviation.target_path.clone(),
            branch: branch.to_string(),
            message: commit_message(deviation),
            content: wrapped.to_string(),
            sha,
        };
        self.gateway
            .put_file(ctx, &deviation.repository, &write)
            .await
            .map_err(fail(RemediationStep::WriteFile, deviation, branch))
    }
}

fn fail<'a>(
    step: RemediationStep,
    deviation: &'a Deviation,
    branch: &'a str,
) -> impl FnOnce(GatewayError) -> RemediationError + 'a {
    move |source| RemediationError {
        step,
        repository: deviation.repository.full_name.clone(),
        branch: branch.to_string(),
        source,
    }
}
