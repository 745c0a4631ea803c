//! Remote repository gateway abstractions.
//!
//! These traits define everything the engines need from the hosting service:
//! - `RepositoryGateway`: listing, contents, refs, file writes, pull requests
//! - `ContentFetcher`: retrieval of canonical policy content by URL
//!
//! Every call takes the shared [`RunContext`] so implementations can abort
//! in-flight I/O on cancellation. In-memory fakes live in [`crate::fakes`].

pub mod error;
pub mod pagination;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::domain::Repository;

pub use error::{GatewayError, GatewayResult};
pub use pagination::{list_all_repositories, RetryPolicy};

/// One page of the organization repository listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryPage {
    pub repositories: Vec<Repository>,
    /// Cursor of the following page; `None` on the last page.
    pub next_page: Option<u32>,
}

/// Decoded file content plus the blob SHA needed to update it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub sha: String,
}

/// Kind of a directory entry returned by [`RepositoryGateway::list_directory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

/// A resolved branch reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRef {
    pub name: String,
    pub sha: String,
}

/// Create-or-update request for a single file on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub branch: String,
    pub message: String,
    pub content: String,
    /// Blob SHA of the file being replaced; `None` creates the file.
    pub sha: Option<String>,
}

/// Pull request state filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    All,
}

impl PullRequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            PullRequestState::Open => "open",
            PullRequestState::Closed => "closed",
            PullRequestState::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
    pub head_branch: String,
    pub base_branch: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// Operations against the repository-hosting service for one organization.
#[async_trait]
pub trait RepositoryGateway: Send + Sync {
    /// Fetch one page of repositories, sorted by full name. `page = None`
    /// requests the first page.
    async fn list_repositories_page(
        &self,
        ctx: &RunContext,
        page: Option<u32>,
    ) -> GatewayResult<RepositoryPage>;

    /// Paths of all blobs in the recursive tree at `HEAD`.
    async fn list_files(&self, ctx: &RunContext, repo: &Repository) -> GatewayResult<Vec<String>>;

    /// Read and decode a file. `git_ref = None` reads the default branch.
    /// Returns [`GatewayError::NotFound`] when the path does not exist.
    async fn get_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
        git_ref: Option<&str>,
    ) -> GatewayResult<FileContent>;

    /// List the entries of a directory on the default branch.
    async fn list_directory(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
    ) -> GatewayResult<Vec<DirectoryEntry>>;

    /// Resolve `refs/heads/<branch>`.
    async fn get_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
    ) -> GatewayResult<BranchRef>;

    /// Create `refs/heads/<branch>` at `base_sha`. Returns
    /// [`GatewayError::AlreadyExists`] when the ref exists.
    async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
        base_sha: &str,
    ) -> GatewayResult<()>;

    /// Create (no SHA) or update (with SHA) a file on a branch.
    async fn put_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        write: &FileWrite,
    ) -> GatewayResult<()>;

    async fn list_pull_requests(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        head_branch: &str,
        state: PullRequestState,
    ) -> GatewayResult<Vec<PullRequest>>;

    async fn create_pull_request(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        request: &NewPullRequest,
    ) -> GatewayResult<PullRequest>;

    /// First open pull request whose head is `head_branch`, if any.
    async fn find_open_pull_request(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        head_branch: &str,
    ) -> GatewayResult<Option<PullRequest>> {
        let prs = self
            .list_pull_requests(ctx, repo, head_branch, PullRequestState::Open)
            .await?;
        Ok(prs.into_iter().next())
    }
}

/// Retrieves canonical policy content.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// GET `url` and return the body. Non-2xx responses are
    /// [`GatewayError::Api`] errors.
    async fn fetch(&self, ctx: &RunContext, url: &str) -> GatewayResult<String>;
}
