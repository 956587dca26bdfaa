use indicatif::ProgressBar;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::acquire::acquire_pipeline_jobs;
use super::download::{download_all, download_stream};
use super::types::{PipelineHandle, SavedArtifact, SelectedJobs};
use super::wait::{wait_for_artifact, WaitOptions};
use crate::config::RunConfig;
use crate::error::{CiArtifactsError, Result};
use crate::providers::SharedGateway;

/// Drives one run: acquire jobs, wait for each of them, download artifacts.
pub struct Coordinator {
    gateway: SharedGateway,
    config: Arc<RunConfig>,
    progress: ProgressBar,
}

impl Coordinator {
    pub fn new(gateway: SharedGateway, config: Arc<RunConfig>) -> Self {
        Self {
            gateway,
            config,
            progress: ProgressBar::hidden(),
        }
    }

    /// Spinner whose message the heartbeat keeps up to date.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Deadline of a run starting now.
    pub fn run_deadline(&self) -> Instant {
        Instant::now() + self.config.timeout
    }

    pub async fn acquire(&self, deadline: Instant) -> Result<(PipelineHandle, SelectedJobs)> {
        let (pipeline, selected) =
            acquire_pipeline_jobs(&self.gateway, &self.config, deadline).await?;

        let mut names: Vec<&str> = selected.values().map(String::as_str).collect();
        names.sort_unstable();
        info!(
            "Jobs acquired from pipeline {} on '{}': {}",
            pipeline.id(),
            pipeline.branch(),
            names.join(", ")
        );

        Ok((pipeline, selected))
    }

    /// Wait for every selected job and download each artifact as soon as its
    /// job has finished.
    ///
    /// Every job runs to completion; the first failure observed is returned
    /// afterwards. Artifacts already written stay on disk.
    pub async fn collect(
        &self,
        pipeline: PipelineHandle,
        selected: SelectedJobs,
        deadline: Instant,
    ) -> Result<Vec<SavedArtifact>> {
        if !self.config.force_trigger {
            // A scanned pipeline only yields jobs that already succeeded.
            return self.download_finished(&pipeline, &selected).await;
        }

        let total = selected.len();
        let pipeline = Arc::new(pipeline);
        let options = WaitOptions {
            poll_interval: self.config.poll_interval,
            timeout: self.job_timeout(deadline),
        };

        let (artifact_tx, artifact_rx) = mpsc::channel(total.max(1));
        let (failure_tx, mut failure_rx) = mpsc::unbounded_channel();

        let mut downloader = tokio::spawn(download_stream(
            artifact_rx,
            self.config.download_folder.clone(),
            failure_tx.clone(),
        ));

        let mut waiters = JoinSet::new();
        for (job_id, job_name) in selected {
            let gateway = SharedGateway::clone(&self.gateway);
            let pipeline = Arc::clone(&pipeline);
            let artifacts = artifact_tx.clone();
            let failures = failure_tx.clone();

            waiters.spawn(async move {
                match wait_for_artifact(&gateway, &pipeline, job_id, &job_name, options).await {
                    Ok(blob) => {
                        if artifacts.send(blob).await.is_err() {
                            let _ = failures.send(CiArtifactsError::TaskFailed {
                                task: format!("artifact hand-over of job '{job_name}'"),
                                reason: "downloader stopped".to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        warn!("{e}");
                        let _ = failures.send(e);
                    }
                }
            });
        }
        // Waiters hold the only senders, so the channel closes once all are done.
        drop(artifact_tx);

        let mut heartbeat = heartbeat(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                joined = waiters.join_next() => match joined {
                    Some(Ok(())) => {}
                    Some(Err(e)) => {
                        let _ = failure_tx.send(CiArtifactsError::TaskFailed {
                            task: "job wait".to_string(),
                            reason: e.to_string(),
                        });
                    }
                    None => break,
                },
                _ = heartbeat.tick() => {
                    self.beat(&format!(
                        "Still waiting for {} of {total} jobs to finish",
                        waiters.len()
                    ));
                }
            }
        }

        let saved = loop {
            tokio::select! {
                finished = &mut downloader => match finished {
                    Ok(saved) => break saved,
                    Err(e) => {
                        let _ = failure_tx.send(CiArtifactsError::TaskFailed {
                            task: "artifact downloader".to_string(),
                            reason: e.to_string(),
                        });
                        break Vec::new();
                    }
                },
                _ = heartbeat.tick() => self.beat("Still writing artifacts to disk"),
            }
        };

        drop(failure_tx);
        let mut failures = Vec::new();
        while let Some(failure) = failure_rx.recv().await {
            failures.push(failure);
        }

        let Some(first) = failures.into_iter().next() else {
            return Ok(saved);
        };

        error!(
            "{} of {total} artifacts could not be collected",
            total - saved.len()
        );
        for artifact in &saved {
            info!("Kept artifact {}", artifact.path.display());
        }
        Err(first)
    }

    /// Download the artifacts of jobs that already succeeded.
    ///
    /// Transfers are never cut short by the run deadline; the heartbeat keeps
    /// reporting while any of them is outstanding.
    async fn download_finished(
        &self,
        pipeline: &PipelineHandle,
        selected: &SelectedJobs,
    ) -> Result<Vec<SavedArtifact>> {
        let total = selected.len();
        let downloads = download_all(
            &self.gateway,
            pipeline,
            selected,
            &self.config.download_folder,
        );
        tokio::pin!(downloads);

        let mut heartbeat = heartbeat(self.config.heartbeat_interval);
        loop {
            tokio::select! {
                result = &mut downloads => return result,
                _ = heartbeat.tick() => {
                    self.beat(&format!("Still downloading {total} artifact(s)"));
                }
            }
        }
    }

    fn job_timeout(&self, deadline: Instant) -> Duration {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.config
            .job_timeout
            .map_or(remaining, |timeout| timeout.min(remaining))
    }

    fn beat(&self, message: &str) {
        info!("{message}");
        self.progress.set_message(message.to_string());
    }
}

fn heartbeat(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
