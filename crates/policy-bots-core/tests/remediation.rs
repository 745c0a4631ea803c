//! Remediation engine: branch, file and pull request protocol.

use std::sync::Arc;

use policy_bots_core::fakes::{FakeOp, InMemoryGateway, StaticContentFetcher};
use policy_bots_core::{
    wrap_content, Deviation, GatewayError, Policy, RemediationAction, RemediationEngine,
    RemediationStep, Repository, RunContext,
};

const SOURCE: &str = "https://policies.test/dockerfile.yml";
const CANONICAL: &str = "name: docker\non: push\n";
const TARGET: &str = ".github/workflows/dockerfile.yml";
const BRANCH: &str = "chore/dockerfile";

struct Harness {
    gateway: Arc<InMemoryGateway>,
    fetcher: Arc<StaticContentFetcher>,
    engine: RemediationEngine,
    repo: Repository,
    policy: Policy,
}

fn harness() -> Harness {
    let gateway = Arc::new(InMemoryGateway::new());
    let repo = Repository::new("stevedores-org", "api");
    gateway.add_repository(repo.clone(), &["Dockerfile", "main.go"]);
    let fetcher = Arc::new(StaticContentFetcher::new().with(SOURCE, CANONICAL));
    let engine = RemediationEngine::new(gateway.clone(), fetcher.clone());
    Harness {
        gateway,
        fetcher,
        engine,
        repo,
        policy: Policy::new("dockerfile", "**/Dockerfile*", SOURCE),
    }
}

impl Harness {
    fn create(&self) -> Deviation {
        Deviation::create(self.repo.clone(), self.policy.clone())
    }

    async fn main_sha(&self, ctx: &RunContext) -> String {
        use policy_bots_core::RepositoryGateway;
        self.gateway
            .get_branch(ctx, &self.repo, "main")
            .await
            .expect("main branch")
            .sha
    }
}

#[tokio::test]
async fn create_deviation_opens_pull_request() {
    let h = harness();
    let ctx = RunContext::background();

    let outcome = h.engine.remediate(&ctx, &h.create()).await.unwrap();

    assert_eq!(outcome.action, RemediationAction::Created);
    let url = outcome.pull_request_url.expect("pull request url");
    assert!(!url.is_empty());
    assert_eq!(
        h.gateway.branch_file(&h.repo, BRANCH, TARGET),
        Some(wrap_content(CANONICAL, "dockerfile"))
    );
    let prs = h.gateway.open_pull_requests(&h.repo);
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].head_branch, BRANCH);
    assert_eq!(prs[0].base_branch, "main");
    assert_eq!(prs[0].title, "chore(gha): add dockerfile workflow");
    let writes = h.gateway.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].1.message, "chore(gha): add dockerfile workflow");
    assert!(writes[0].1.sha.is_none());
}

#[tokio::test]
async fn second_run_is_skipped_without_duplicates() {
    let h = harness();
    let ctx = RunContext::background();
    let deviation = h.create();

    let first = h.engine.remediate(&ctx, &deviation).await.unwrap();
    let second = h.engine.remediate(&ctx, &deviation).await.unwrap();

    assert_eq!(first.action, RemediationAction::Created);
    assert_eq!(second.action, RemediationAction::Skipped);
    assert_eq!(second.pull_request_url, first.pull_request_url);
    assert_eq!(h.gateway.open_pull_requests(&h.repo).len(), 1);
    assert_eq!(h.gateway.calls(FakeOp::CreateBranch), 1);
    assert_eq!(h.gateway.writes().len(), 1);
    assert_eq!(h.fetcher.calls(), 2, "canonical content is fetched per remediation");
}

#[tokio::test]
async fn open_pull_request_with_stale_branch_is_updated() {
    let h = harness();
    let ctx = RunContext::background();
    h.gateway
        .put_branch_file(&h.repo, BRANCH, TARGET, "outdated\n");
    let pr = h.gateway.add_pull_request(&h.repo, BRANCH, "main");

    let deviation = Deviation::update(h.repo.clone(), h.policy.clone(), "outdated\n".into());
    let outcome = h.engine.remediate(&ctx, &deviation).await.unwrap();

    assert_eq!(outcome.action, RemediationAction::Updated);
    assert_eq!(outcome.pull_request_url.as_deref(), Some(pr.html_url.as_str()));
    assert_eq!(
        h.gateway.branch_file(&h.repo, BRANCH, TARGET),
        Some(wrap_content(CANONICAL, "dockerfile"))
    );
    let writes = h.gateway.writes();
    assert_eq!(writes[0].1.message, "chore(gha): update dockerfile workflow");
    assert!(writes[0].1.sha.is_some(), "update must carry the blob sha");
    assert_eq!(h.gateway.calls(FakeOp::CreatePullRequest), 0);
}

#[tokio::test]
async fn master_is_used_when_main_is_missing() {
    let h = harness();
    h.gateway.set_default_branch(&h.repo, "master");
    let ctx = RunContext::background();

    let outcome = h.engine.remediate(&ctx, &h.create()).await.unwrap();

    assert_eq!(outcome.action, RemediationAction::Created);
    assert_eq!(h.gateway.open_pull_requests(&h.repo)[0].base_branch, "master");
}

#[tokio::test]
async fn pre_existing_branch_is_reused() {
    let h = harness();
    let ctx = RunContext::background();
    let sha = h.main_sha(&ctx).await;
    h.gateway.add_branch(&h.repo, BRANCH, &sha);

    let outcome = h.engine.remediate(&ctx, &h.create()).await.unwrap();

    assert_eq!(outcome.action, RemediationAction::Created);
    assert_eq!(h.gateway.open_pull_requests(&h.repo).len(), 1);
}

#[tokio::test]
async fn failed_create_is_tolerated_when_branch_exists() {
    let h = harness();
    let ctx = RunContext::background();
    let sha = h.main_sha(&ctx).await;
    h.gateway.add_branch(&h.repo, BRANCH, &sha);
    h.gateway.fail_always(
        FakeOp::CreateBranch,
        &h.repo,
        GatewayError::Api {
            status: 500,
            message: "ref update race".into(),
        },
    );

    let outcome = h.engine.remediate(&ctx, &h.create()).await.unwrap();
    assert_eq!(outcome.action, RemediationAction::Created);
}

#[tokio::test]
async fn failed_create_without_branch_is_an_error() {
    let h = harness();
    let ctx = RunContext::background();
    h.gateway.fail_always(
        FakeOp::CreateBranch,
        &h.repo,
        GatewayError::Api {
            status: 500,
            message: "boom".into(),
        },
    );

    let err = h.engine.remediate(&ctx, &h.create()).await.unwrap_err();

    assert_eq!(err.step, RemediationStep::CreateBranch);
    let msg = err.to_string();
    assert!(msg.contains("stevedores-org/api"));
    assert!(msg.contains(BRANCH));
}

#[tokio::test]
async fn missing_base_branch_is_an_error() {
    let h = harness();
    h.gateway.set_default_branch(&h.repo, "trunk");
    let ctx = RunContext::background();

    let err = h.engine.remediate(&ctx, &h.create()).await.unwrap_err();
    assert_eq!(err.step, RemediationStep::ResolveBaseBranch);
    assert!(err.source.is_not_found());
}

#[tokio::test]
async fn failed_write_names_the_step() {
    let h = harness();
    h.gateway.fail_always(
        FakeOp::PutFile,
        &h.repo,
        GatewayError::Api {
            status: 409,
            message: "conflict".into(),
        },
    );
    let ctx = RunContext::background();

    let err = h.engine.remediate(&ctx, &h.create()).await.unwrap_err();
    assert_eq!(err.step, RemediationStep::WriteFile);
    assert_eq!(h.gateway.open_pull_requests(&h.repo).len(), 0);
}

#[tokio::test]
async fn cancelled_context_stops_remediation() {
    let h = harness();
    let (ctx, handle) = RunContext::with_cancel();
    handle.cancel();

    let err = h.engine.remediate(&ctx, &h.create()).await.unwrap_err();
    assert_eq!(err.step, RemediationStep::FetchCanonical);
    assert!(err.source.context_error().is_some());
    assert_eq!(h.gateway.total_calls(), 0);
}
