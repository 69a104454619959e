//! Explicit run configuration.
//!
//! The binary resolves flags, environment variables and build-time defaults
//! into [`Settings`]; [`Settings::validate`] turns that into a [`RunConfig`]
//! or a [`ConfigError`] before any probing starts. Nothing below `main`
//! reads the process environment.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::engine::{EngineConfig, ScoringPolicy};
use crate::error::{ConfigError, SubmitError};
use crate::metadata::MetadataOverrides;
use crate::probe::ProbeConfig;
use crate::sink::{CollectorSink, GhCliSink, GhMethod, GitHubApiSink, GitPushSink, ResultSink};
use crate::types::Target;

// Build-time defaults, e.g. `V6PROBE_DEFAULT_GH_REPO=acme/results cargo build --release`.
pub const BUILTIN_API_TOKEN: Option<&str> = option_env!("V6PROBE_DEFAULT_API_TOKEN");
pub const BUILTIN_API_URL: Option<&str> = option_env!("V6PROBE_DEFAULT_API_URL");
pub const BUILTIN_GH_TOKEN: Option<&str> = option_env!("V6PROBE_DEFAULT_GH_TOKEN");
pub const BUILTIN_GH_REPO: Option<&str> = option_env!("V6PROBE_DEFAULT_GH_REPO");
pub const BUILTIN_GH_METHOD: Option<&str> = option_env!("V6PROBE_DEFAULT_GH_METHOD");
pub const BUILTIN_GIT_REPO: Option<&str> = option_env!("V6PROBE_DEFAULT_GIT_REPO");
pub const BUILTIN_GIT_BRANCH: Option<&str> = option_env!("V6PROBE_DEFAULT_GIT_BRANCH");
pub const BUILTIN_LOCATION: Option<&str> = option_env!("V6PROBE_DEFAULT_LOCATION");

/// First non-empty of an explicit value (flag or environment) and a build-time default.
pub fn resolve(value: Option<String>, builtin: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            builtin
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
}

/// Raw submission selections as given by the user.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub collector: bool,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub gh_cli: bool,
    pub gh_repo: Option<String>,
    pub gh_method: GhMethod,
    pub git_push: bool,
    pub git_repo: Option<String>,
    pub git_branch: String,
    pub github_api: bool,
    pub gh_token: Option<String>,
}

/// One validated submission backend.
#[derive(Clone, PartialEq, Eq)]
pub enum SinkSpec {
    Collector { url: String, token: String },
    GhCli { repo: String, method: GhMethod },
    GitPush { repo_url: String, branch: String },
    GitHubApi { repo: String, token: String },
}

impl SinkSpec {
    pub fn build(&self) -> Result<Box<dyn ResultSink>, SubmitError> {
        Ok(match self {
            SinkSpec::Collector { url, token } => Box::new(CollectorSink::new(url, token)?),
            SinkSpec::GhCli { repo, method } => Box::new(GhCliSink::new(repo, *method)),
            SinkSpec::GitPush { repo_url, branch } => Box::new(GitPushSink::new(repo_url, branch)),
            SinkSpec::GitHubApi { repo, token } => Box::new(GitHubApiSink::new(repo, token)?),
        })
    }
}

// Tokens stay out of Display so specs can be printed and logged.
impl fmt::Display for SinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkSpec::Collector { url, .. } => write!(f, "Collector API → {url}"),
            SinkSpec::GhCli { repo, method } => write!(f, "GitHub CLI ({method}) → {repo}"),
            SinkSpec::GitPush { repo_url, branch } => write!(f, "Git push → {repo_url} ({branch})"),
            SinkSpec::GitHubApi { repo, .. } => write!(f, "GitHub API → {repo}"),
        }
    }
}

/// Everything the binary collected, before validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub concurrency: usize,
    pub timeout: Duration,
    pub deadline: Option<Duration>,
    pub max_redirects: u8,
    pub policy: ScoringPolicy,
    pub overrides: MetadataOverrides,
    pub submit: SubmitOptions,
}

/// Validated configuration handed to the engine, metadata provider and sinks.
pub struct RunConfig {
    pub probe: ProbeConfig,
    pub engine: EngineConfig,
    pub overrides: MetadataOverrides,
    pub sinks: Vec<SinkSpec>,
}

impl Settings {
    /// Check every option against `targets`; `on_path` reports whether an
    /// external tool is installed.
    pub fn validate(
        self,
        targets: &[Target],
        on_path: impl Fn(&str) -> bool,
    ) -> Result<RunConfig, ConfigError> {
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                flag: "--concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                flag: "--timeout-ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.policy.validate().is_err() {
            return Err(ConfigError::InvalidValue {
                flag: "--ipv4-weight/--ipv6-weight",
                reason: "weights must not both be zero".into(),
            });
        }

        let sinks = self.submit.into_specs(&on_path)?;
        Ok(RunConfig {
            probe: ProbeConfig {
                timeout: self.timeout,
                max_redirects: self.max_redirects,
            },
            engine: EngineConfig {
                concurrency: self.concurrency,
                deadline: self.deadline,
                policy: self.policy,
            },
            overrides: self.overrides,
            sinks,
        })
    }
}

impl SubmitOptions {
    fn into_specs(self, on_path: &impl Fn(&str) -> bool) -> Result<Vec<SinkSpec>, ConfigError> {
        let mut specs = Vec::new();

        if self.collector {
            let url = require(self.api_url, "--api-url", "--submit-collector")?;
            let token = require(self.api_token, "--api-token", "--submit-collector")?;
            specs.push(SinkSpec::Collector { url, token });
        }
        if self.gh_cli {
            let repo = require(self.gh_repo.clone(), "--gh-repo", "--submit-gh")?;
            if !on_path("gh") {
                return Err(ConfigError::MissingTool {
                    tool: "GitHub CLI (gh)",
                    mode: "--submit-gh",
                });
            }
            specs.push(SinkSpec::GhCli {
                repo,
                method: self.gh_method,
            });
        }
        if self.git_push {
            let repo_url = require(self.git_repo, "--git-repo", "--submit-git")?;
            if !on_path("git") {
                return Err(ConfigError::MissingTool {
                    tool: "git",
                    mode: "--submit-git",
                });
            }
            specs.push(SinkSpec::GitPush {
                repo_url,
                branch: self.git_branch,
            });
        }
        if self.github_api {
            let repo = require(self.gh_repo, "--gh-repo", "--submit-api")?;
            let token = require(self.gh_token, "--gh-token or GITHUB_TOKEN", "--submit-api")?;
            specs.push(SinkSpec::GitHubApi { repo, token });
        }
        Ok(specs)
    }
}

fn require(
    value: Option<String>,
    flag: &'static str,
    mode: &'static str,
) -> Result<String, ConfigError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingOption { flag, mode })
}

/// Whether an executable named `tool` exists in a `PATH` directory.
pub fn on_path(tool: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    let file = format!("{tool}{}", std::env::consts::EXE_SUFFIX);
    std::env::split_paths(&paths).any(|dir| is_file(&dir.join(&file)))
}

fn is_file(p: &Path) -> bool {
    p.metadata().map(|m| m.is_file()).unwrap_or(false)
}
