use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use v6probe::config::{self, Settings, SubmitOptions};
use v6probe::engine::{ConnectivityEngine, ScoringPolicy, DEFAULT_CONCURRENCY};
use v6probe::metadata::{self, MetadataOverrides, MetadataProvider};
use v6probe::probe::{HttpProber, DEFAULT_MAX_REDIRECTS};
use v6probe::render::{self, Palette};
use v6probe::report::{self, ResultRecord};
use v6probe::sink::{self, git_push::DEFAULT_BRANCH, GhMethod, ResultSink};
use v6probe::targets;

/// Measure IPv4 and IPv6 reachability of well-known sites and score it.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "v6probe",
    version,
    about = "Measure IPv4 and IPv6 reachability of well-known sites, score it, and optionally submit the result.",
    long_about = None
)]
struct Cli {
    /// Path to a target file (`Name URL` per line). Defaults to the built-in site list.
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Max concurrent probes.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-probe timeout in milliseconds, redirects included.
    #[arg(long = "timeout-ms", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Global run deadline in seconds; unfinished probes count as failed.
    #[arg(long = "deadline-secs")]
    deadline_secs: Option<u64>,

    /// Redirects followed before a probe fails.
    #[arg(long = "max-redirects", default_value_t = DEFAULT_MAX_REDIRECTS)]
    max_redirects: u8,

    /// Relative score weight of IPv4.
    #[arg(long = "ipv4-weight", default_value_t = 40)]
    ipv4_weight: u32,

    /// Relative score weight of IPv6.
    #[arg(long = "ipv6-weight", default_value_t = 60)]
    ipv6_weight: u32,

    /// Test point identifier (defaults to the hostname).
    #[arg(long = "test-point-id", env = "TEST_POINT_ID")]
    test_point_id: Option<String>,

    /// Geographic location of the test point.
    #[arg(long, env = "LOCATION")]
    location: Option<String>,

    /// Skip public address and ASN lookups.
    #[arg(long = "skip-detect", default_value_t = false)]
    skip_detect: bool,

    /// Write the result record as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print the result record as JSON instead of the human-readable report.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Submit the result record to the collector API.
    #[arg(long = "submit-collector", default_value_t = false)]
    submit_collector: bool,

    /// Collector API endpoint.
    #[arg(long = "api-url", env = "API_URL")]
    api_url: Option<String>,

    /// Collector API bearer token.
    #[arg(long = "api-token", env = "IPV6_ARMY_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Submit results via the GitHub CLI (gh).
    #[arg(long = "submit-gh", default_value_t = false)]
    submit_gh: bool,

    /// Submit results via direct git push.
    #[arg(long = "submit-git", default_value_t = false)]
    submit_git: bool,

    /// Submit results via the GitHub REST API.
    #[arg(long = "submit-api", default_value_t = false)]
    submit_api: bool,

    /// Target GitHub repository (owner/repo).
    #[arg(long = "gh-repo", env = "GH_REPO")]
    gh_repo: Option<String>,

    /// GitHub CLI method: `issue` or `pr`.
    #[arg(long = "gh-method", env = "GH_METHOD")]
    gh_method: Option<String>,

    /// GitHub token for --submit-api.
    #[arg(long = "gh-token", env = "GITHUB_TOKEN", hide_env_values = true)]
    gh_token: Option<String>,

    /// Git repository URL for --submit-git.
    #[arg(long = "git-repo", env = "GIT_REPO")]
    git_repo: Option<String>,

    /// Git branch for --submit-git.
    #[arg(long = "git-branch", env = "GIT_BRANCH")]
    git_branch: Option<String>,

    /// Disable colored output.
    #[arg(long = "no-color", default_value_t = false)]
    no_color: bool,

    /// Show per-site results and debug logs.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let gh_method = match config::resolve(self.gh_method.clone(), config::BUILTIN_GH_METHOD) {
            Some(m) => m
                .parse::<GhMethod>()
                .map_err(|e| anyhow::anyhow!("invalid value for --gh-method: {e}"))?,
            None => GhMethod::default(),
        };
        Ok(Settings {
            concurrency: self.concurrency,
            timeout: Duration::from_millis(self.timeout_ms),
            deadline: self.deadline_secs.map(Duration::from_secs),
            max_redirects: self.max_redirects,
            policy: ScoringPolicy {
                ipv4_weight: self.ipv4_weight,
                ipv6_weight: self.ipv6_weight,
            },
            overrides: MetadataOverrides {
                test_point_id: config::resolve(self.test_point_id.clone(), None),
                location: config::resolve(self.location.clone(), config::BUILTIN_LOCATION),
            },
            submit: SubmitOptions {
                collector: self.submit_collector,
                api_url: config::resolve(self.api_url.clone(), config::BUILTIN_API_URL),
                api_token: config::resolve(self.api_token.clone(), config::BUILTIN_API_TOKEN),
                gh_cli: self.submit_gh,
                gh_repo: config::resolve(self.gh_repo.clone(), config::BUILTIN_GH_REPO),
                gh_method,
                git_push: self.submit_git,
                git_repo: config::resolve(self.git_repo.clone(), config::BUILTIN_GIT_REPO),
                git_branch: config::resolve(self.git_branch.clone(), config::BUILTIN_GIT_BRANCH)
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                github_api: self.submit_api,
                gh_token: config::resolve(self.gh_token.clone(), config::BUILTIN_GH_TOKEN),
            },
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let palette = Palette::detect(
        cli.no_color,
        std::env::var("NO_COLOR").ok().as_deref(),
    );

    // Validation happens before any network traffic.
    let target_list = match cli.targets.as_deref() {
        Some(path) => targets::load_targets_from_path(path)?,
        None => targets::default_targets(),
    };
    let run = cli
        .settings()?
        .validate(&target_list, config::on_path)
        .context("invalid configuration")?;
    let prober = HttpProber::new(run.probe).context("failed to initialise TLS")?;
    let engine = ConnectivityEngine::new(prober, run.engine);

    if !cli.json {
        println!("IPv6 Connectivity Test Tool");
        println!("===========================\n");
    }

    let meta = if cli.skip_detect {
        metadata::local_identity(&run.overrides)
    } else {
        if !cli.json {
            println!("{}Detecting test point information...{}", palette.yellow, palette.reset);
        }
        MetadataProvider::default().detect(&run.overrides).await
    };
    if !cli.json {
        print!("{}", render::format_test_point(&meta, &run.sinks, &palette));
        println!(
            "\n{}Testing connectivity to {} sites...{}",
            palette.yellow,
            target_list.len(),
            palette.reset
        );
    }

    // Ctrl-C abandons in-flight probes; the partial run is still reported.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let summary = engine.run_with_cancel(&target_list, cancel).await?;
    let record = report::assemble(summary, meta);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        render::print_report(&record, cli.verbose, &palette);
    }

    if let Some(path) = cli.output.as_deref() {
        match write_record_json(path, &record) {
            Ok(()) => info!(path = %path.display(), "wrote JSON result record"),
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "failed to write JSON result record"),
        }
    }

    if !run.sinks.is_empty() {
        let mut sinks: Vec<Box<dyn ResultSink>> = Vec::with_capacity(run.sinks.len());
        for spec in &run.sinks {
            match spec.build() {
                Ok(s) => sinks.push(s),
                Err(e) => warn!(sink = %spec, error = %e, "could not set up result sink"),
            }
        }
        let reports = sink::submit_all(&sinks, &record).await;
        if !cli.json {
            println!();
            print!("{}", render::format_submissions(&reports, &palette));
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "v6probe=debug" } else { "v6probe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn write_record_json(path: &Path, record: &ResultRecord) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, record)?;
    Ok(())
}
