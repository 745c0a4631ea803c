//! In-memory fakes for the gateway traits (testing only)
//!
//! Provides `InMemoryGateway` and `StaticContentFetcher`, which honour the
//! trait contracts (not-found, already-exists, SHA-guarded writes) without a
//! network. Faults and latency can be injected per operation.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::context::RunContext;
use crate::domain::Repository;
use crate::gateway::*;

/// Gateway operation, used to target injected faults and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FakeOp {
    ListRepositories,
    ListFiles,
    GetFile,
    ListDirectory,
    GetBranch,
    CreateBranch,
    PutFile,
    ListPullRequests,
    CreatePullRequest,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// InMemoryGateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredPull {
    repository: String,
    open: bool,
    pull: PullRequest,
}

#[derive(Debug, Default)]
struct GatewayState {
    repositories: Vec<Repository>,
    default_branches: HashMap<String, String>,
    /// (repository, branch) -> head sha
    branches: HashMap<(String, String), String>,
    /// (repository, branch) -> path -> (content, blob sha)
    files: HashMap<(String, String), BTreeMap<String, (String, String)>>,
    pulls: Vec<StoredPull>,
    writes: Vec<(String, FileWrite)>,
    /// Consumed one per call, any repository.
    queued_faults: HashMap<FakeOp, VecDeque<GatewayError>>,
    /// Returned on every call for the repository.
    sticky_faults: HashMap<(FakeOp, String), GatewayError>,
    delays: HashMap<FakeOp, Duration>,
    calls: HashMap<FakeOp, usize>,
    in_flight: usize,
    max_in_flight: usize,
    next_id: u64,
}

impl GatewayState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn default_branch(&self, repo: &str) -> String {
        self.default_branches
            .get(repo)
            .cloned()
            .unwrap_or_else(|| "main".to_string())
    }
}

/// In-memory repository host for one organization.
#[derive(Debug)]
pub struct InMemoryGateway {
    page_size: usize,
    state: Mutex<GatewayState>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            state: Mutex::new(GatewayState::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register `repo` with a `main` branch holding `files` (empty content).
    pub fn add_repository(&self, repo: Repository, files: &[&str]) {
        let mut state = lock(&self.state);
        let full = repo.full_name.clone();
        let sha = format!("commit-{}", state.next_id());
        state.branches.insert((full.clone(), "main".to_string()), sha);
        let tree = files
            .iter()
            .map(|path| (path.to_string(), (String::new(), format!("blob-{path}"))))
            .collect();
        state.files.insert((full, "main".to_string()), tree);
        state.repositories.push(repo);
    }

    /// Rename the default branch of `repo` (e.g. to `master`).
    pub fn set_default_branch(&self, repo: &Repository, branch: &str) {
        let mut state = lock(&self.state);
        let full = repo.full_name.clone();
        let old = state.default_branch(&full);
        if let Some(sha) = state.branches.remove(&(full.clone(), old.clone())) {
            state.branches.insert((full.clone(), branch.to_string()), sha);
        }
        if let Some(tree) = state.files.remove(&(full.clone(), old)) {
            state.files.insert((full.clone(), branch.to_string()), tree);
        }
        state.default_branches.insert(full, branch.to_string());
    }

    /// Store a file on the default branch.
    pub fn put_default_file(&self, repo: &Repository, path: &str, content: &str) {
        let branch = lock(&self.state).default_branch(&repo.full_name);
        self.put_branch_file(repo, &branch, path, content);
    }

    /// Store a file on `branch`, creating the branch when missing.
    pub fn put_branch_file(&self, repo: &Repository, branch: &str, path: &str, content: &str) {
        let mut state = lock(&self.state);
        let key = (repo.full_name.clone(), branch.to_string());
        if !state.branches.contains_key(&key) {
            let sha = format!("commit-{}", state.next_id());
            state.branches.insert(key.clone(), sha);
        }
        let blob = format!("blob-{}", state.next_id());
        state
            .files
            .entry(key)
            .or_default()
            .insert(path.to_string(), (content.to_string(), blob));
    }

    pub fn add_branch(&self, repo: &Repository, branch: &str, sha: &str) {
        lock(&self.state)
            .branches
            .insert((repo.full_name.clone(), branch.to_string()), sha.to_string());
    }

    /// Open a pull request from `head` into `base` without any checks.
    pub fn add_pull_request(&self, repo: &Repository, head: &str, base: &str) -> PullRequest {
        let mut state = lock(&self.state);
        let number = state.next_id();
        let pull = PullRequest {
            number,
            html_url: format!("https://github.test/{}/pull/{number}", repo.full_name),
            head_branch: head.to_string(),
            base_branch: base.to_string(),
            title: format!("pull request {number}"),
        };
        state.pulls.push(StoredPull {
            repository: repo.full_name.clone(),
            open: true,
            pull: pull.clone(),
        });
        pull
    }

    pub fn close_pull_request(&self, repo: &Repository, number: u64) {
        let mut state = lock(&self.state);
        for stored in state.pulls.iter_mut() {
            if stored.repository == repo.full_name && stored.pull.number == number {
                stored.open = false;
            }
        }
    }

    /// Make the next call of `op` fail with `error`. Queued faults are
    /// consumed in order.
    pub fn fail_next(&self, op: FakeOp, error: GatewayError) {
        lock(&self.state)
            .queued_faults
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make every call of `op` against `repo` fail with `error`.
    pub fn fail_always(&self, op: FakeOp, repo: &Repository, error: GatewayError) {
        lock(&self.state)
            .sticky_faults
            .insert((op, repo.full_name.clone()), error);
    }

    /// Delay every call of `op`; the delay honours the run context.
    pub fn delay(&self, op: FakeOp, delay: Duration) {
        lock(&self.state).delays.insert(op, delay);
    }

    pub fn calls(&self, op: FakeOp) -> usize {
        lock(&self.state).calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.values().sum()
    }

    /// Highest number of concurrently delayed calls observed.
    pub fn max_in_flight(&self) -> usize {
        lock(&self.state).max_in_flight
    }

    pub fn writes(&self) -> Vec<(String, FileWrite)> {
        lock(&self.state).writes.clone()
    }

    pub fn branch_exists(&self, repo: &Repository, branch: &str) -> bool {
        lock(&self.state)
            .branches
            .contains_key(&(repo.full_name.clone(), branch.to_string()))
    }

    pub fn branch_file(&self, repo: &Repository, branch: &str, path: &str) -> Option<String> {
        lock(&self.state)
            .files
            .get(&(repo.full_name.clone(), branch.to_string()))
            .and_then(|tree| tree.get(path))
            .map(|(content, _)| content.clone())
    }

    pub fn open_pull_requests(&self, repo: &Repository) -> Vec<PullRequest> {
        lock(&self.state)
            .pulls
            .iter()
            .filter(|p| p.open && p.repository == repo.full_name)
            .map(|p| p.pull.clone())
            .collect()
    }

    /// Bookkeeping shared by every operation: count, fault, delay.
    async fn enter(&self, ctx: &RunContext, op: FakeOp, repo: Option<&str>) -> GatewayResult<()> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let delay = {
            let mut state = lock(&self.state);
            *state.calls.entry(op).or_insert(0) += 1;
            if let Some(err) = state.queued_faults.get_mut(&op).and_then(VecDeque::pop_front) {
                return Err(err);
            }
            if let Some(repo) = repo {
                if let Some(err) = state.sticky_faults.get(&(op, repo.to_string())) {
                    return Err(err.clone());
                }
            }
            let delay = state.delays.get(&op).copied();
            if delay.is_some() {
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
            }
            delay
        };

        if let Some(delay) = delay {
            let slept = ctx.sleep(delay).await;
            lock(&self.state).in_flight -= 1;
            slept?;
        }
        Ok(())
    }
}

#[async_trait]
impl RepositoryGateway for InMemoryGateway {
    async fn list_repositories_page(
        &self,
        ctx: &RunContext,
        page: Option<u32>,
    ) -> GatewayResult<RepositoryPage> {
        self.enter(ctx, FakeOp::ListRepositories, None).await?;
        let state = lock(&self.state);
        let index = page.unwrap_or(1).max(1) as usize - 1;
        let start = index * self.page_size;
        let repositories: Vec<Repository> = state
            .repositories
            .iter()
            .skip(start)
            .take(self.page_size)
            .cloned()
            .collect();
        let next_page = (start + self.page_size < state.repositories.len())
            .then(|| index as u32 + 2);
        Ok(RepositoryPage {
            repositories,
            next_page,
        })
    }

    async fn list_files(&self, ctx: &RunContext, repo: &Repository) -> GatewayResult<Vec<String>> {
        self.enter(ctx, FakeOp::ListFiles, Some(&repo.full_name))
            .await?;
        let state = lock(&self.state);
        let branch = state.default_branch(&repo.full_name);
        state
            .files
            .get(&(repo.full_name.clone(), branch))
            .map(|tree| tree.keys().cloned().collect())
            .ok_or_else(|| GatewayError::not_found(format!("tree of {}", repo.full_name)))
    }

    async fn get_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
        git_ref: Option<&str>,
    ) -> GatewayResult<FileContent> {
        self.enter(ctx, FakeOp::GetFile, Some(&repo.full_name)).await?;
        let state = lock(&self.state);
        let branch = git_ref
            .map(str::to_string)
            .unwrap_or_else(|| state.default_branch(&repo.full_name));
        state
            .files
            .get(&(repo.full_name.clone(), branch.clone()))
            .and_then(|tree| tree.get(path))
            .map(|(content, sha)| FileContent {
                content: content.clone(),
                sha: sha.clone(),
            })
            .ok_or_else(|| {
                GatewayError::not_found(format!("{}:{branch}:{path}", repo.full_name))
            })
    }

    async fn list_directory(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
    ) -> GatewayResult<Vec<DirectoryEntry>> {
        self.enter(ctx, FakeOp::ListDirectory, Some(&repo.full_name))
            .await?;
        let state = lock(&self.state);
        let branch = state.default_branch(&repo.full_name);
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut entries: BTreeMap<String, DirectoryEntry> = BTreeMap::new();
        if let Some(tree) = state.files.get(&(repo.full_name.clone(), branch)) {
            for file in tree.keys() {
                let Some(rest) = file.strip_prefix(&prefix) else {
                    continue;
                };
                let (name, kind) = match rest.split_once('/') {
                    Some((dir, _)) => (dir, EntryKind::Dir),
                    None => (rest, EntryKind::File),
                };
                entries.entry(name.to_string()).or_insert(DirectoryEntry {
                    name: name.to_string(),
                    path: format!("{prefix}{name}"),
                    kind,
                });
            }
        }
        if entries.is_empty() {
            return Err(GatewayError::not_found(format!("{}:{path}", repo.full_name)));
        }
        Ok(entries.into_values().collect())
    }

    async fn get_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
    ) -> GatewayResult<BranchRef> {
        self.enter(ctx, FakeOp::GetBranch, Some(&repo.full_name))
            .await?;
        lock(&self.state)
            .branches
            .get(&(repo.full_name.clone(), branch.to_string()))
            .map(|sha| BranchRef {
                name: branch.to_string(),
                sha: sha.clone(),
            })
            .ok_or_else(|| GatewayError::not_found(format!("{}:refs/heads/{branch}", repo.full_name)))
    }

    async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
        base_sha: &str,
    ) -> GatewayResult<()> {
        self.enter(ctx, FakeOp::CreateBranch, Some(&repo.full_name))
            .await?;
        let mut state = lock(&self.state);
        let key = (repo.full_name.clone(), branch.to_string());
        if state.branches.contains_key(&key) {
            return Err(GatewayError::already_exists(format!(
                "{}:refs/heads/{branch}",
                repo.full_name
            )));
        }
        let source = state
            .branches
            .iter()
            .find(|((r, _), sha)| *r == repo.full_name && sha.as_str() == base_sha)
            .map(|((_, b), _)| b.clone());
        let tree = source
            .and_then(|b| state.files.get(&(repo.full_name.clone(), b)).cloned())
            .unwrap_or_default();
        state.branches.insert(key.clone(), base_sha.to_string());
        state.files.insert(key, tree);
        Ok(())
    }

    async fn put_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        write: &FileWrite,
    ) -> GatewayResult<()> {
        self.enter(ctx, FakeOp::PutFile, Some(&repo.full_name)).await?;
        let mut state = lock(&self.state);
        let key = (repo.full_name.clone(), write.branch.clone());
        if !state.branches.contains_key(&key) {
            return Err(GatewayError::not_found(format!(
                "{}:refs/heads/{}",
                repo.full_name, write.branch
            )));
        }
        let current_sha = state
            .files
            .get(&key)
            .and_then(|tree| tree.get(&write.path))
            .map(|(_, sha)| sha.clone());
        if current_sha != write.sha {
            return Err(GatewayError::Api {
                status: if write.sha.is_none() { 422 } else { 409 },
                message: format!("{} does not match the current blob", write.path),
            });
        }
        let blob = format!("blob-{}", state.next_id());
        let commit = format!("commit-{}", state.next_id());
        state
            .files
            .entry(key.clone())
            .or_default()
            .insert(write.path.clone(), (write.content.clone(), blob));
        state.branches.insert(key, commit);
        state.writes.push((repo.full_name.clone(), write.clone()));
        Ok(())
    }

    async fn list_pull_requests(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        head_branch: &str,
        state_filter: PullRequestState,
    ) -> GatewayResult<Vec<PullRequest>> {
        self.enter(ctx, FakeOp::ListPullRequests, Some(&repo.full_name))
            .await?;
        Ok(lock(&self.state)
            .pulls
            .iter()
            .filter(|p| p.repository == repo.full_name && p.pull.head_branch == head_branch)
            .filter(|p| match state_filter {
                PullRequestState::Open => p.open,
                PullRequestState::Closed => !p.open,
                PullRequestState::All => true,
            })
            .map(|p| p.pull.clone())
            .collect())
    }

    async fn create_pull_request(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        request: &NewPullRequest,
    ) -> GatewayResult<PullRequest> {
        self.enter(ctx, FakeOp::CreatePullRequest, Some(&repo.full_name))
            .await?;
        let mut state = lock(&self.state);
        let duplicate = state.pulls.iter().any(|p| {
            p.open && p.repository == repo.full_name && p.pull.head_branch == request.head
        });
        if duplicate {
            return Err(GatewayError::Api {
                status: 422,
                message: format!("A pull request already exists for {}", request.head),
            });
        }
        for branch in [&request.head, &request.base] {
            if !state
                .branches
                .contains_key(&(repo.full_name.clone(), branch.clone()))
            {
                return Err(GatewayError::Api {
                    status: 422,
                    message: format!("unknown branch {branch}"),
                });
            }
        }
        let number = state.next_id();
        let pull = PullRequest {
            number,
            html_url: format!("https://github.test/{}/pull/{number}", repo.full_name),
            head_branch: request.head.clone(),
            base_branch: request.base.clone(),
            title: request.title.clone(),
        };
        state.pulls.push(StoredPull {
            repository: repo.full_name.clone(),
            open: true,
            pull: pull.clone(),
        });
        Ok(pull)
    }
}

// ---------------------------------------------------------------------------
// StaticContentFetcher
// ---------------------------------------------------------------------------

/// Canonical content served from a fixed URL map. Unknown URLs are 404s.
#[derive(Debug, Default)]
pub struct StaticContentFetcher {
    bodies: Mutex<HashMap<String, GatewayResult<String>>>,
    calls: Mutex<usize>,
}

impl StaticContentFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, body: &str) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&self, url: &str, body: &str) {
        lock(&self.bodies).insert(url.to_string(), Ok(body.to_string()));
    }

    pub fn fail(&self, url: &str, error: GatewayError) {
        lock(&self.bodies).insert(url.to_string(), Err(error));
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

#[async_trait]
impl ContentFetcher for StaticContentFetcher {
    async fn fetch(&self, ctx: &RunContext, url: &str) -> GatewayResult<String> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        *lock(&self.calls) += 1;
        lock(&self.bodies)
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                Err(GatewayError::Api {
                    status: 404,
                    message: format!("no content at {url}"),
                })
            })
    }
}
