//! reqwest-backed [`RepositoryGateway`] for one GitHub organization.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use policy_bots_core::context::RunContext;
use policy_bots_core::domain::Repository;
use policy_bots_core::gateway::{
    BranchRef, DirectoryEntry, EntryKind, FileContent, FileWrite, GatewayError, GatewayResult,
    NewPullRequest, PullRequest, PullRequestState, RepositoryGateway, RepositoryPage,
};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::GitHubConfig;
use crate::error::{self, GitHubError};
use crate::models::*;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// GitHub REST client
#[derive(Debug, Clone)]
pub struct GitHubClient {
    config: GitHubConfig,
    base: Url,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Create a new client; the token, when set, is sent on every request.
    pub fn new(config: GitHubConfig) -> error::Result<Self> {
        if config.organization.trim().is_empty() {
            return Err(GitHubError::MissingOrganization);
        }
        let base = parse_api_url(&config.api_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(ACCEPT));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| GitHubError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(GitHubClient { config, base, http })
    }

    /// Create client from environment variables
    pub fn from_env() -> error::Result<Self> {
        Self::new(GitHubConfig::from_env())
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    pub fn organization(&self) -> &str {
        &self.config.organization
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn repo_endpoint<'a>(&self, repo: &'a Repository, rest: &[&'a str]) -> Url {
        let mut segments: Vec<&str> = vec!["repos"];
        segments.extend(repo.full_name.split('/'));
        segments.extend(rest.iter().copied());
        self.endpoint(segments)
    }

    /// Send `request`, racing it against the context; non-success statuses
    /// are mapped to [`GatewayError`].
    async fn send(&self, ctx: &RunContext, resource: &str, request: RequestBuilder) -> GatewayResult<Response> {
        debug!(resource = %resource, "github request");
        let response = ctx.run(request.send()).await?.map_err(error::transport)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ctx.run(error::from_response(resource, response)).await?)
        }
    }

    async fn json<T: DeserializeOwned>(&self, ctx: &RunContext, response: Response) -> GatewayResult<T> {
        ctx.run(response.json::<T>()).await?.map_err(|e| GatewayError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, ctx: &RunContext, resource: &str, url: Url) -> GatewayResult<T> {
        let response = self.send(ctx, resource, self.http.get(url)).await?;
        self.json(ctx, response).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        ctx: &RunContext,
        method: Method,
        resource: &str,
        url: Url,
        body: &B,
    ) -> GatewayResult<T> {
        let response = self
            .send(ctx, resource, self.http.request(method, url).json(body))
            .await?;
        self.json(ctx, response).await
    }

    async fn contents(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
        git_ref: Option<&str>,
    ) -> GatewayResult<ContentsDto> {
        let mut rest = vec!["contents"];
        rest.extend(path.split('/'));
        let mut url = self.repo_endpoint(repo, &rest);
        if let Some(git_ref) = git_ref {
            url.query_pairs_mut().append_pair("ref", git_ref);
        }
        let resource = format!("{}:{}", repo.full_name, path);
        self.get_json(ctx, &resource, url).await
    }
}

fn parse_api_url(raw: &str) -> error::Result<Url> {
    let invalid = |reason: &str| GitHubError::InvalidApiUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(invalid("expected an absolute http(s) URL"));
    }
    Ok(url)
}

/// `page` of the `rel="next"` target in a `Link` header.
pub(crate) fn next_page(headers: &HeaderMap) -> Option<u32> {
    let link = headers.get(header::LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let url = Url::parse(target).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "page")
            .and_then(|(_, value)| value.parse().ok())
    })
}

/// Decode a base64 `contents` payload; GitHub wraps it at 60 columns.
pub(crate) fn decode_content(path: &str, encoded: &str) -> GatewayResult<String> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| GatewayError::Decode(format!("{path}: {e}")))?;
    String::from_utf8(bytes).map_err(|e| GatewayError::Decode(format!("{path}: {e}")))
}

fn entry_kind(kind: &str) -> EntryKind {
    match kind {
        "file" => EntryKind::File,
        "dir" => EntryKind::Dir,
        _ => EntryKind::Other,
    }
}

impl From<PullRequestDto> for PullRequest {
    fn from(dto: PullRequestDto) -> Self {
        PullRequest {
            number: dto.number,
            html_url: dto.html_url,
            head_branch: dto.head.git_ref,
            base_branch: dto.base.git_ref,
            title: dto.title,
        }
    }
}

#[async_trait]
impl RepositoryGateway for GitHubClient {
    async fn list_repositories_page(
        &self,
        ctx: &RunContext,
        page: Option<u32>,
    ) -> GatewayResult<RepositoryPage> {
        let current = page.unwrap_or(1);
        let mut url = self.endpoint(["orgs", self.config.organization.as_str(), "repos"]);
        url.query_pairs_mut()
            .append_pair("sort", "full_name")
            .append_pair("per_page", &self.config.per_page.to_string())
            .append_pair("page", &current.to_string());

        let resource = format!("orgs/{}/repos", self.config.organization);
        let response = self.send(ctx, &resource, self.http.get(url)).await?;
        let next = next_page(response.headers()).filter(|n| *n > current);
        let repositories: Vec<RepositoryDto> = self.json(ctx, response).await?;

        Ok(RepositoryPage {
            repositories: repositories
                .into_iter()
                .map(|r| Repository {
                    name: r.name,
                    full_name: r.full_name,
                    is_private: r.private,
                    is_archived: r.archived,
                })
                .collect(),
            next_page: next,
        })
    }

    async fn list_files(&self, ctx: &RunContext, repo: &Repository) -> GatewayResult<Vec<String>> {
        let mut url = self.repo_endpoint(repo, &["git", "trees", "HEAD"]);
        url.query_pairs_mut().append_pair("recursive", "1");
        let tree: TreeDto = self
            .get_json(ctx, &format!("{}:tree", repo.full_name), url)
            .await?;
        if tree.truncated {
            warn!(repository = %repo.full_name, "recursive tree truncated, file list is partial");
        }
        Ok(tree
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| e.path)
            .collect())
    }

    async fn get_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
        git_ref: Option<&str>,
    ) -> GatewayResult<FileContent> {
        match self.contents(ctx, repo, path, git_ref).await? {
            ContentsDto::Entry(entry) if entry.kind == "file" => {
                if let Some(encoding) = entry.encoding.as_deref() {
                    if encoding != "base64" {
                        return Err(GatewayError::Decode(format!(
                            "{path}: unsupported encoding '{encoding}'"
                        )));
                    }
                }
                let content = decode_content(path, entry.content.as_deref().unwrap_or_default())?;
                Ok(FileContent {
                    content,
                    sha: entry.sha,
                })
            }
            ContentsDto::Entry(entry) => Err(GatewayError::Decode(format!(
                "{path}: expected a file, found {}",
                entry.kind
            ))),
            ContentsDto::Directory(_) => Err(GatewayError::Decode(format!(
                "{path}: expected a file, found a directory"
            ))),
        }
    }

    async fn list_directory(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        path: &str,
    ) -> GatewayResult<Vec<DirectoryEntry>> {
        match self.contents(ctx, repo, path, None).await? {
            ContentsDto::Directory(entries) => Ok(entries
                .into_iter()
                .map(|e| DirectoryEntry {
                    kind: entry_kind(&e.kind),
                    name: e.name,
                    path: e.path,
                })
                .collect()),
            ContentsDto::Entry(_) => Err(GatewayError::Decode(format!(
                "{path}: expected a directory, found a file"
            ))),
        }
    }

    async fn get_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
    ) -> GatewayResult<BranchRef> {
        let mut rest = vec!["git", "ref", "heads"];
        rest.extend(branch.split('/'));
        let url = self.repo_endpoint(repo, &rest);
        let resource = format!("{}:refs/heads/{branch}", repo.full_name);
        let git_ref: RefDto = self.get_json(ctx, &resource, url).await?;
        Ok(BranchRef {
            name: branch.to_string(),
            sha: git_ref.object.sha,
        })
    }

    async fn create_branch(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        branch: &str,
        base_sha: &str,
    ) -> GatewayResult<()> {
        let url = self.repo_endpoint(repo, &["git", "refs"]);
        let resource = format!("{}:refs/heads/{branch}", repo.full_name);
        let body = CreateRefBody {
            git_ref: format!("refs/heads/{branch}"),
            sha: base_sha,
        };
        let _: serde_json::Value = self
            .send_json(ctx, Method::POST, &resource, url, &body)
            .await?;
        Ok(())
    }

    async fn put_file(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        write: &FileWrite,
    ) -> GatewayResult<()> {
        let mut rest = vec!["contents"];
        rest.extend(write.path.split('/'));
        let url = self.repo_endpoint(repo, &rest);
        let resource = format!("{}:{}:{}", repo.full_name, write.branch, write.path);
        let body = PutContentsBody {
            message: &write.message,
            content: STANDARD.encode(write.content.as_bytes()),
            branch: &write.branch,
            sha: write.sha.as_deref(),
        };
        let _: serde_json::Value = self
            .send_json(ctx, Method::PUT, &resource, url, &body)
            .await?;
        Ok(())
    }

    async fn list_pull_requests(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        head_branch: &str,
        state: PullRequestState,
    ) -> GatewayResult<Vec<PullRequest>> {
        let owner = repo
            .full_name
            .split_once('/')
            .map(|(owner, _)| owner)
            .unwrap_or(self.config.organization.as_str());
        let mut url = self.repo_endpoint(repo, &["pulls"]);
        url.query_pairs_mut()
            .append_pair("head", &format!("{owner}:{head_branch}"))
            .append_pair("state", state.as_str());
        let resource = format!("{}:pulls", repo.full_name);
        let pulls: Vec<PullRequestDto> = self.get_json(ctx, &resource, url).await?;
        Ok(pulls.into_iter().map(PullRequest::from).collect())
    }

    async fn create_pull_request(
        &self,
        ctx: &RunContext,
        repo: &Repository,
        request: &NewPullRequest,
    ) -> GatewayResult<PullRequest> {
        let url = self.repo_endpoint(repo, &["pulls"]);
        let resource = format!("{}:pulls", repo.full_name);
        let body = CreatePullBody {
            title: &request.title,
            body: &request.body,
            head: &request.head,
            base: &request.base,
        };
        let pull: PullRequestDto = self
            .send_json(ctx, Method::POST, &resource, url, &body)
            .await?;
        Ok(pull.into())
    }
}
