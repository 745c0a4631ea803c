//! Policy Bot CLI
//!
//! The `policy-bot` command keeps the workflows of every repository in an
//! organization in line with a catalog of workflow policies.
//!
//! ## Commands
//!
//! - `run`: detect drift and open or amend pull requests
//! - `audit`: detect drift only, write nothing
//! - `policies`: print the loaded policy catalog
//! - `workflows`: list the workflow files of one repository

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use github_gateway::{GitHubClient, GitHubConfig, HttpContentFetcher, DEFAULT_API_URL};
use policy_bots_core::{
    list_workflows, FleetOrchestrator, OrchestratorConfig, PolicyCatalog, Repository,
    RetryPolicy, RunContext, WorkflowFile,
};
use serde::Serialize;
use tracing::{info, warn, Level};

/// Catalog used when `--policies` is not given.
const DEFAULT_POLICIES: &str = include_str!("../policies/github-actions.json");

#[derive(Parser)]
#[command(name = "policy-bot")]
#[command(author = "Stevedores Org")]
#[command(version = policy_bots_core::VERSION)]
#[command(about = "Workflow policy drift detection and remediation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// GitHub organization to scan
    #[arg(long, global = true, env = "POLICY_BOT_ORG")]
    org: Option<String>,

    /// GitHub token (required for `run`)
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitHub REST API root
    #[arg(long, global = true, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Policy catalog JSON file (default: embedded catalog)
    #[arg(long, global = true, env = "POLICY_BOT_POLICIES")]
    policies: Option<PathBuf>,

    /// Report format on stdout
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect drift and open or amend pull requests
    Run(FleetArgs),

    /// Detect drift only; nothing is written
    Audit(FleetArgs),

    /// Print the loaded policy catalog
    Policies,

    /// List the workflow files of one repository
    Workflows {
        /// Repository name, or owner/name
        repo: String,

        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

#[derive(Args, Debug, Clone)]
struct FleetArgs {
    /// Deadline for the whole run, in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Repositories processed concurrently
    #[arg(long, default_value = "1")]
    concurrency: usize,

    /// Attempts per rate-limited listing call
    #[arg(long, default_value = "5")]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    policy_bots_core::telemetry::init_tracing(cli.json, level);

    let catalog = load_catalog(cli.policies.as_deref())?;

    match &cli.command {
        Commands::Policies => {
            println!("{}", render_policies(&catalog, cli.output)?);
            Ok(())
        }
        Commands::Run(args) => cmd_run(&cli, catalog, args).await,
        Commands::Audit(args) => cmd_audit(&cli, catalog, args).await,
        Commands::Workflows { repo, timeout_secs } => {
            cmd_workflows(&cli, repo, *timeout_secs).await
        }
    }
}

fn load_catalog(path: Option<&Path>) -> Result<PolicyCatalog> {
    match path {
        Some(path) => PolicyCatalog::from_file(path)
            .with_context(|| format!("Failed to load policy catalog {}", path.display())),
        None => PolicyCatalog::from_json(DEFAULT_POLICIES.as_bytes())
            .context("Embedded policy catalog is invalid"),
    }
}

fn github_config(cli: &Cli, require_token: bool) -> Result<GitHubConfig> {
    let org = cli
        .org
        .as_deref()
        .filter(|o| !o.trim().is_empty())
        .context("No organization given (use --org or POLICY_BOT_ORG)")?;
    let mut config = GitHubConfig::new(&cli.api_url, org);
    match cli.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => config = config.with_token(token),
        None if require_token => {
            anyhow::bail!("A GitHub token is required (use --token or GITHUB_TOKEN)")
        }
        None => warn!("no GitHub token configured, requests are unauthenticated"),
    }
    Ok(config)
}

/// Run context cancelled on Ctrl-C, with an optional deadline.
fn run_context(timeout_secs: Option<u64>) -> RunContext {
    let (ctx, cancel) = RunContext::with_cancel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling run");
            cancel.cancel();
        }
    });
    match timeout_secs {
        Some(secs) => ctx.with_timeout(Duration::from_secs(secs)),
        None => ctx,
    }
}

fn orchestrator(
    cli: &Cli,
    catalog: PolicyCatalog,
    args: &FleetArgs,
    require_token: bool,
) -> Result<FleetOrchestrator> {
    let config = github_config(cli, require_token)?;
    let organization = config.organization.clone();
    let fetcher =
        HttpContentFetcher::new(&config.user_agent, Duration::from_secs(config.timeout_secs))
            .context("Failed to build content fetcher")?;
    let gateway = GitHubClient::new(config).context("Failed to build GitHub client")?;

    let orchestrator_config = OrchestratorConfig::new(organization)
        .with_concurrency(args.concurrency)
        .with_retry(RetryPolicy::default().with_max_attempts(args.max_retries));

    Ok(FleetOrchestrator::new(
        Arc::new(catalog),
        Arc::new(gateway),
        Arc::new(fetcher),
        orchestrator_config,
    ))
}

async fn cmd_run(cli: &Cli, catalog: PolicyCatalog, args: &FleetArgs) -> Result<()> {
    let orchestrator = orchestrator(cli, catalog, args, true)?;
    let ctx = run_context(args.timeout_secs);

    let report = orchestrator.run(&ctx).await.context("Policy run failed")?;
    info!(
        created = report.totals.created,
        updated = report.totals.updated,
        skipped = report.totals.skipped,
        failed = report.totals.failed,
        "policy run complete"
    );

    match cli.output {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

async fn cmd_audit(cli: &Cli, catalog: PolicyCatalog, args: &FleetArgs) -> Result<()> {
    let orchestrator = orchestrator(cli, catalog, args, false)?;
    let ctx = run_context(args.timeout_secs);

    let report = orchestrator.audit(&ctx).await.context("Policy audit failed")?;

    match cli.output {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

async fn cmd_workflows(cli: &Cli, repo: &str, timeout_secs: u64) -> Result<()> {
    let config = github_config(cli, false)?.with_timeout(timeout_secs);
    let repository = parse_repository(repo, &config.organization);
    let gateway = GitHubClient::new(config).context("Failed to build GitHub client")?;
    let ctx = run_context(None);

    let workflows = list_workflows(&ctx, &gateway, &repository)
        .await
        .with_context(|| format!("Failed to list workflows of {repository}"))?;

    println!("{}", render_workflows(&repository, &workflows, cli.output)?);
    Ok(())
}

/// `owner/name` as given, or `name` within `organization`.
fn parse_repository(repo: &str, organization: &str) -> Repository {
    match repo.split_once('/') {
        Some((owner, name)) => Repository::new(owner, name),
        None => Repository::new(organization, repo),
    }
}

fn render_policies(catalog: &PolicyCatalog, output: OutputFormat) -> Result<String> {
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(catalog)?),
        OutputFormat::Text => {
            let mut out = format!("{} policies\n", catalog.len());
            for policy in catalog {
                out.push_str(&format!(
                    "  {:<16} {:<24} -> {}\n",
                    policy.name,
                    policy.match_pattern,
                    policy.target_path()
                ));
            }
            Ok(out.trim_end().to_string())
        }
    }
}

#[derive(Serialize)]
struct WorkflowListing<'a> {
    repository: &'a str,
    workflows: &'a [WorkflowFile],
}

fn render_workflows(
    repository: &Repository,
    workflows: &[WorkflowFile],
    output: OutputFormat,
) -> Result<String> {
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&WorkflowListing {
            repository: &repository.full_name,
            workflows,
        })?),
        OutputFormat::Text => {
            let mut out = format!("{}: {} workflow files\n", repository, workflows.len());
            for workflow in workflows {
                let managed = if policy_bots_core::wrap::is_managed(&workflow.content) {
                    " (managed)"
                } else {
                    ""
                };
                out.push_str(&format!("  {}{}\n", workflow.path, managed));
            }
            Ok(out.trim_end().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_embedded_catalog_loads() {
        let catalog = load_catalog(None).unwrap();
        assert!(!catalog.is_empty());
        assert!(catalog.get("dockerfile").is_some());
    }

    #[test]
    fn test_catalog_file_overrides_embedded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "go", "match_file": "**/go.mod", "source": "https://example.com/go.yml"}}]"#
        )
        .unwrap();
        let catalog = load_catalog(Some(file.path())).unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_malformed_catalog_fails_startup() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[{{\"name\": \"go\"}}]").unwrap();
        let err = load_catalog(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("Failed to load policy catalog"));
    }

    #[test]
    fn test_run_flags_parse() {
        let cli = Cli::try_parse_from([
            "policy-bot",
            "--org",
            "stevedores-org",
            "--output",
            "json",
            "run",
            "--concurrency",
            "4",
            "--timeout-secs",
            "600",
        ])
        .unwrap();
        assert_eq!(cli.org.as_deref(), Some("stevedores-org"));
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.concurrency, 4);
                assert_eq!(args.timeout_secs, Some(600));
                assert_eq!(args.max_retries, 5);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_token() {
        let cli = Cli::try_parse_from(["policy-bot", "--org", "o", "--token", "", "run"]).unwrap();
        let err = github_config(&cli, true).unwrap_err();
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_parse_repository() {
        assert_eq!(parse_repository("api", "org").full_name, "org/api");
        assert_eq!(parse_repository("other/web", "org").full_name, "other/web");
    }

    #[test]
    fn test_render_policies_text_lists_targets() {
        let catalog = load_catalog(None).unwrap();
        let text = render_policies(&catalog, OutputFormat::Text).unwrap();
        assert!(text.contains(".github/workflows/dockerfile.yml"));
    }

    #[test]
    fn test_render_workflows_marks_managed_files() {
        let repo = Repository::new("org", "api");
        let workflows = vec![
            WorkflowFile {
                name: "go.yml".into(),
                path: ".github/workflows/go.yml".into(),
                content: policy_bots_core::wrap_content("on: push\n", "go"),
            },
            WorkflowFile {
                name: "ci.yml".into(),
                path: ".github/workflows/ci.yml".into(),
                content: "on: push\n".into(),
            },
        ];
        let text = render_workflows(&repo, &workflows, OutputFormat::Text).unwrap();
        assert!(text.contains(".github/workflows/go.yml (managed)"));
        assert!(!text.contains("ci.yml (managed)"));

        let json = render_workflows(&repo, &workflows, OutputFormat::Json).unwrap();
        assert!(json.contains("\"repository\": \"org/api\""));
    }
}
