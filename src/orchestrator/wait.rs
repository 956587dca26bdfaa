use log::{debug, info};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use super::types::{ArtifactBlob, JobProgress, PipelineHandle};
use crate::error::{CiArtifactsError, Result};
use crate::providers::SharedGateway;

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Poll a job until it finishes, then fetch its artifact.
///
/// The first status check happens immediately, later ones every
/// `poll_interval`. The timeout covers polling and the artifact fetch and only
/// ever stops this job's wait.
pub async fn wait_for_artifact(
    gateway: &SharedGateway,
    pipeline: &PipelineHandle,
    job_id: u64,
    job_name: &str,
    options: WaitOptions,
) -> Result<ArtifactBlob> {
    tokio::time::timeout(
        options.timeout,
        poll_until_finished(gateway, pipeline, job_id, job_name, options.poll_interval),
    )
    .await
    .map_err(|_| CiArtifactsError::Timeout {
        operation: format!("waiting for job '{job_name}'"),
        after: options.timeout,
    })?
}

async fn poll_until_finished(
    gateway: &SharedGateway,
    pipeline: &PipelineHandle,
    job_id: u64,
    job_name: &str,
    poll_interval: Duration,
) -> Result<ArtifactBlob> {
    let project_id = pipeline.project_id();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let job = gateway.get_job(&project_id, job_id).await?;
        match job.status.progress() {
            JobProgress::InProgress => {
                debug!("Job '{job_name}' ({job_id}) is {}", job.status);
            }
            JobProgress::Succeeded => {
                info!("Job '{job_name}' succeeded, fetching its artifact");
                let content = gateway
                    .get_job_artifact(&project_id, job_id)
                    .await
                    .map_err(|e| CiArtifactsError::download(job_name, e))?;
                return Ok(ArtifactBlob {
                    job_name: job_name.to_string(),
                    content,
                });
            }
            JobProgress::Unsuccessful => {
                return Err(CiArtifactsError::JobNotSuccessful {
                    job: job_name.to_string(),
                    status: job.status,
                });
            }
            JobProgress::Unknown => {
                return Err(CiArtifactsError::UnrecognizedStatus {
                    job: job_name.to_string(),
                    status: job.status.to_string(),
                });
            }
        }
    }
}
