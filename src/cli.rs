use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{FileConfig, RunConfig};
use crate::error::CiArtifactsError;
use crate::orchestrator::Coordinator;
use crate::output::{bright_green, print_summary, PhaseProgress};
use crate::providers::gitlab::GitLabClient;
use crate::providers::SharedGateway;

#[derive(Parser)]
#[command(name = "ci-artifacts")]
#[command(
    author,
    version,
    about = "Download GitLab CI job artifacts from a triggered or finished pipeline",
    long_about = None
)]
pub struct Cli {
    /// Configuration file (defaults to ci-artifacts.{toml,json,yaml,yml})
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// GitLab group or namespace
    #[arg(short, long, env = "GAD_PROJECT")]
    project: Option<String>,

    /// Repository inside the group
    #[arg(short, long, env = "GAD_REPO")]
    repository: Option<String>,

    #[arg(short, long, env = "GAD_BRANCH")]
    branch: Option<String>,

    /// Access token (GAD_TOKEN is also read when GITLAB_TOKEN is unset)
    #[arg(short, long, env = "GITLAB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// GitLab instance base URL
    #[arg(short, long, env = "GAD_URL")]
    url: Option<String>,

    /// Job whose artifact is wanted (repeatable, comma-separated)
    #[arg(short, long = "artifact", value_delimiter = ',')]
    artifacts: Vec<String>,

    #[arg(short, long)]
    download_folder: Option<PathBuf>,

    /// Trigger a new pipeline instead of reusing a finished one
    #[arg(long)]
    force_trigger: bool,

    /// Cancel jobs of the triggered pipeline that are not wanted
    #[arg(long)]
    cancel_unneeded_jobs: bool,

    /// Pipeline variable as KEY=VALUE or KEY:VALUE (repeatable)
    #[arg(short = 'k', long = "variable", value_parser = parse_variable)]
    variables: Vec<(String, String)>,

    /// Overall run timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Timeout of a single job's wait in seconds
    #[arg(long, value_name = "SECS")]
    job_timeout: Option<u64>,

    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    #[arg(long, value_name = "SECS")]
    heartbeat_interval: Option<u64>,

    #[arg(long)]
    page_size: Option<usize>,

    /// Maximum number of finished pipelines to search
    #[arg(long)]
    pipelines_limit: Option<usize>,
}

fn parse_variable(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once(['=', ':'])
        .ok_or_else(|| format!("expected KEY=VALUE or KEY:VALUE, got '{raw}'"))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("variable name missing in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Name the failed phase, and the GitLab instance when the failure came from it.
fn phase_error(error: CiArtifactsError, phase: &str, base_url: &str) -> anyhow::Error {
    let error = if error.is_gateway() {
        anyhow::Error::new(error).context(format!("Request to GitLab at {base_url} failed"))
    } else {
        anyhow::Error::new(error)
    };
    error.context(phase.to_string())
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            project: self.project.clone(),
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            token: self
                .token
                .clone()
                .or_else(|| std::env::var("GAD_TOKEN").ok()),
            base_url: self.url.clone(),
            jobs: self.artifacts.clone(),
            download_folder: self.download_folder.clone(),
            variables: self.variables.iter().cloned().collect(),
            force_trigger: self.force_trigger.then_some(true),
            cancel_unneeded_jobs: self.cancel_unneeded_jobs.then_some(true),
            timeout_secs: self.timeout,
            job_timeout_secs: self.job_timeout,
            poll_interval_secs: self.poll_interval,
            heartbeat_interval_secs: self.heartbeat_interval,
            page_size: self.page_size,
            pipelines_limit: self.pipelines_limit,
        }
    }

    fn run_config(&self) -> Result<RunConfig> {
        let file = FileConfig::load(self.config.as_deref())?;
        let config = RunConfig::try_from(file.merged_with(self.overrides()))
            .context("Invalid configuration")?;
        Ok(config)
    }

    pub async fn execute(&self) -> Result<()> {
        let config = Arc::new(self.run_config()?);
        info!(
            "Collecting artifacts of {} job(s) from {}/{} on branch '{}'",
            config.jobs.len(),
            config.project,
            config.repository,
            config.branch
        );

        let client = GitLabClient::new(&config.base_url, config.token.clone())?;
        let gateway: SharedGateway = Arc::new(client);

        let progress = PhaseProgress::start_acquire();
        let coordinator =
            Coordinator::new(gateway, Arc::clone(&config)).with_progress(progress.bar());
        let deadline = coordinator.run_deadline();

        let (pipeline, selected) = match coordinator.acquire(deadline).await {
            Ok(acquired) => acquired,
            Err(e) => {
                progress.fail();
                return Err(phase_error(
                    e,
                    "Failed to find jobs with the requested artifacts",
                    &config.base_url,
                ));
            }
        };

        let progress = progress.finish_acquire_start_collect(pipeline.id());
        let coordinator = coordinator.with_progress(progress.bar());

        let saved = match coordinator.collect(pipeline, selected, deadline).await {
            Ok(saved) => saved,
            Err(e) => {
                progress.fail();
                return Err(phase_error(e, "Failed to download artifacts", &config.base_url));
            }
        };
        progress.finish_collect(saved.len());

        print_summary(&saved, &config.download_folder);
        println!("{}", bright_green("Artifacts were downloaded!"));

        Ok(())
    }
}
