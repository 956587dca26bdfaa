use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Token;
use crate::error::CiArtifactsError;
use crate::orchestrator::types::{PipelineSpec, SearchCriteria};

pub const DEFAULT_BASE_URL: &str = "https://gitlab.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 1800;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_PIPELINES_LIMIT: usize = 100;

const CONFIG_CANDIDATES: [&str; 4] = [
    "ci-artifacts.toml",
    "ci-artifacts.json",
    "ci-artifacts.yaml",
    "ci-artifacts.yml",
];

/// Configuration file structure.
///
/// Every field is optional so that command-line flags can fill in or
/// override whatever the file leaves out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    /// GitLab group or namespace
    pub project: Option<String>,

    /// Repository inside the group
    pub repository: Option<String>,

    /// Branch pipelines are triggered on or searched in
    pub branch: Option<String>,

    /// GitLab access token
    pub token: Option<String>,

    /// GitLab instance base URL
    pub base_url: Option<String>,

    /// Names of the jobs whose artifacts are wanted
    #[serde(default)]
    pub jobs: Vec<String>,

    /// Folder the `<job>.zip` archives are written to
    pub download_folder: Option<PathBuf>,

    /// Variables passed to a triggered pipeline
    #[serde(default)]
    pub variables: IndexMap<String, String>,

    /// Always trigger a new pipeline instead of reusing a finished one
    pub force_trigger: Option<bool>,

    /// Cancel the jobs of a triggered pipeline that are not wanted
    pub cancel_unneeded_jobs: Option<bool>,

    pub timeout_secs: Option<u64>,
    pub job_timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub page_size: Option<usize>,

    /// Maximum number of finished pipelines examined when searching
    pub pipelines_limit: Option<usize>,
}

impl FileConfig {
    /// Load configuration from a file.
    ///
    /// Uses `path` when given, otherwise the first of `ci-artifacts.toml`,
    /// `ci-artifacts.json`, `ci-artifacts.yaml` or `ci-artifacts.yml` found in
    /// the current directory. Returns an empty configuration if there is none.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Self::discover(&cwd)
    }

    fn discover(dir: &Path) -> Result<Self> {
        for candidate in &CONFIG_CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }

    /// Layer `overrides` on top of `self`.
    ///
    /// Scalars set in `overrides` win, a non-empty job list replaces the
    /// file's list and variables are merged key by key.
    #[must_use]
    pub fn merged_with(self, overrides: FileConfig) -> Self {
        let mut variables = self.variables;
        variables.extend(overrides.variables);

        Self {
            project: overrides.project.or(self.project),
            repository: overrides.repository.or(self.repository),
            branch: overrides.branch.or(self.branch),
            token: overrides.token.or(self.token),
            base_url: overrides.base_url.or(self.base_url),
            jobs: if overrides.jobs.is_empty() {
                self.jobs
            } else {
                overrides.jobs
            },
            download_folder: overrides.download_folder.or(self.download_folder),
            variables,
            force_trigger: overrides.force_trigger.or(self.force_trigger),
            cancel_unneeded_jobs: overrides.cancel_unneeded_jobs.or(self.cancel_unneeded_jobs),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            job_timeout_secs: overrides.job_timeout_secs.or(self.job_timeout_secs),
            poll_interval_secs: overrides.poll_interval_secs.or(self.poll_interval_secs),
            heartbeat_interval_secs: overrides
                .heartbeat_interval_secs
                .or(self.heartbeat_interval_secs),
            page_size: overrides.page_size.or(self.page_size),
            pipelines_limit: overrides.pipelines_limit.or(self.pipelines_limit),
        }
    }
}

/// Validated settings of one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub project: String,
    pub repository: String,
    pub branch: String,
    pub token: Option<Token>,
    pub base_url: String,
    pub jobs: BTreeSet<String>,
    pub download_folder: PathBuf,
    pub variables: IndexMap<String, String>,
    pub force_trigger: bool,
    pub cancel_unneeded_jobs: bool,
    /// Budget of the whole run, acquisition included.
    pub timeout: Duration,
    /// Upper bound for a single job's wait; the remaining run budget applies
    /// when unset or smaller.
    pub job_timeout: Option<Duration>,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub page_size: usize,
    pub pipelines_limit: usize,
}

fn required(value: Option<String>, name: &str) -> Result<String, CiArtifactsError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CiArtifactsError::Config(format!("missing required setting '{name}'")))
}

fn positive_secs(value: Option<u64>, default: u64, name: &str) -> Result<Duration, CiArtifactsError> {
    match value.unwrap_or(default) {
        0 => Err(CiArtifactsError::Config(format!("'{name}' must be greater than zero"))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn positive_count(value: Option<usize>, default: usize, name: &str) -> Result<usize, CiArtifactsError> {
    match value.unwrap_or(default) {
        0 => Err(CiArtifactsError::Config(format!("'{name}' must be greater than zero"))),
        count => Ok(count),
    }
}

impl TryFrom<FileConfig> for RunConfig {
    type Error = CiArtifactsError;

    fn try_from(config: FileConfig) -> Result<Self, Self::Error> {
        let jobs: BTreeSet<String> = config
            .jobs
            .iter()
            .map(|job| job.trim())
            .filter(|job| !job.is_empty())
            .map(ToString::to_string)
            .collect();
        if jobs.is_empty() {
            return Err(CiArtifactsError::Config(
                "at least one job name is required".to_string(),
            ));
        }

        let job_timeout = match config.job_timeout_secs {
            Some(0) => {
                return Err(CiArtifactsError::Config(
                    "'job-timeout-secs' must be greater than zero".to_string(),
                ))
            }
            other => other.map(Duration::from_secs),
        };

        Ok(Self {
            project: required(config.project, "project")?,
            repository: required(config.repository, "repository")?,
            branch: required(config.branch, "branch")?,
            token: config.token.filter(|t| !t.is_empty()).map(Token::from),
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            jobs,
            download_folder: config
                .download_folder
                .unwrap_or_else(|| PathBuf::from(".")),
            variables: config.variables,
            force_trigger: config.force_trigger.unwrap_or(false),
            cancel_unneeded_jobs: config.cancel_unneeded_jobs.unwrap_or(false),
            timeout: positive_secs(config.timeout_secs, DEFAULT_TIMEOUT_SECS, "timeout-secs")?,
            job_timeout,
            poll_interval: positive_secs(
                config.poll_interval_secs,
                DEFAULT_POLL_INTERVAL_SECS,
                "poll-interval-secs",
            )?,
            heartbeat_interval: positive_secs(
                config.heartbeat_interval_secs,
                DEFAULT_HEARTBEAT_INTERVAL_SECS,
                "heartbeat-interval-secs",
            )?,
            page_size: positive_count(config.page_size, DEFAULT_PAGE_SIZE, "page-size")?,
            pipelines_limit: positive_count(
                config.pipelines_limit,
                DEFAULT_PIPELINES_LIMIT,
                "pipelines-limit",
            )?,
        })
    }
}

impl RunConfig {
    pub fn pipeline_spec(&self) -> PipelineSpec {
        PipelineSpec {
            project: self.project.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            variables: self.variables.clone(),
        }
    }

    pub fn search_criteria(&self) -> SearchCriteria {
        SearchCriteria::named(self.jobs.iter().cloned())
    }

    #[cfg(test)]
    pub fn for_tests(jobs: &[&str], download_folder: &Path) -> Self {
        let file = FileConfig {
            project: Some("group".to_string()),
            repository: Some("repo".to_string()),
            branch: Some("main".to_string()),
            jobs: jobs.iter().map(ToString::to_string).collect(),
            download_folder: Some(download_folder.to_path_buf()),
            ..FileConfig::default()
        };
        Self::try_from(file).unwrap()
    }
}
