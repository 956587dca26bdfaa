use std::time::Duration;

use thiserror::Error;

use crate::orchestrator::types::{JobStatus, SelectedJobs};

#[derive(Error, Debug)]
pub enum CiArtifactsError {
    #[error("GitLab API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("GitLab API request failed with status {status} after {retries} retries")]
    ApiErrorAfterRetries { status: u16, retries: u32 },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No jobs named {wanted:?} were found in pipeline {pipeline_id}")]
    NoMatchingJobs {
        pipeline_id: u64,
        wanted: Vec<String>,
    },

    #[error("Pipeline {pipeline_id} is missing jobs {missing:?}")]
    IncompleteMatch {
        pipeline_id: u64,
        found: SelectedJobs,
        missing: Vec<String>,
    },

    #[error("No suitable pipeline found on branch '{branch}' after scanning {scanned} pipelines")]
    NoSuitablePipeline { branch: String, scanned: usize },

    #[error("Job '{job}' finished with status '{status}'")]
    JobNotSuccessful { job: String, status: JobStatus },

    #[error("Job '{job}' reported an unrecognized status '{status}'")]
    UnrecognizedStatus { job: String, status: String },

    #[error("Timed out after {after:?} while {operation}")]
    Timeout { operation: String, after: Duration },

    #[error("Failed to download artifact of job '{job}': {source}")]
    Download {
        job: String,
        #[source]
        source: Box<CiArtifactsError>,
    },

    #[error("Background task for '{task}' did not complete: {reason}")]
    TaskFailed { task: String, reason: String },
}

impl CiArtifactsError {
    /// Whether the error came from talking to the remote CI service.
    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            Self::ApiError { .. } | Self::ApiErrorAfterRetries { .. } | Self::Network(_)
        )
    }

    pub(crate) fn download(job: &str, source: CiArtifactsError) -> Self {
        Self::Download {
            job: job.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, CiArtifactsError>;
