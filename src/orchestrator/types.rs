use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a pipeline lives, before it has an ID.
///
/// Resolving it with [`PipelineSpec::resolve`] is the only way to obtain a
/// [`PipelineHandle`], so the pipeline ID is assigned exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSpec {
    pub project: String,
    pub repository: String,
    pub branch: String,
    pub variables: IndexMap<String, String>,
}

impl PipelineSpec {
    /// Path-style project identifier, e.g. `group/repo`.
    pub fn project_id(&self) -> String {
        format!("{}/{}", self.project, self.repository)
    }

    pub fn resolve(self, id: u64) -> PipelineHandle {
        PipelineHandle { spec: self, id }
    }
}

/// A created or selected pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineHandle {
    spec: PipelineSpec,
    id: u64,
}

impl PipelineHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn project_id(&self) -> String {
        self.spec.project_id()
    }

    pub fn branch(&self) -> &str {
        &self.spec.branch
    }

    pub fn variables(&self) -> &IndexMap<String, String> {
        &self.spec.variables
    }
}

/// Job status as reported by GitLab.
///
/// Anything outside the modelled set is kept verbatim in `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobStatus {
    Pending,
    Created,
    Running,
    Success,
    Failed,
    Canceled,
    Skipped,
    Manual,
    Unrecognized(String),
}

/// What a single status observation means for a waiting job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    InProgress,
    Succeeded,
    Unsuccessful,
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Skipped => "skipped",
            Self::Manual => "manual",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn progress(&self) -> JobProgress {
        match self {
            Self::Pending | Self::Created | Self::Running => JobProgress::InProgress,
            Self::Success => JobProgress::Succeeded,
            Self::Failed | Self::Canceled | Self::Skipped | Self::Manual => {
                JobProgress::Unsuccessful
            }
            Self::Unrecognized(_) => JobProgress::Unknown,
        }
    }
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => Self::Pending,
            "created" => Self::Created,
            "running" => Self::Running,
            "success" => Self::Success,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            "skipped" => Self::Skipped,
            "manual" => Self::Manual,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<&str> for JobStatus {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<JobStatus> for String {
    fn from(value: JobStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job as returned by one gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobDescriptor {
    pub id: u64,
    pub name: String,
    pub status: JobStatus,
}

/// Which jobs to look for and which statuses the listing is filtered by.
#[derive(Debug, Clone, Default)]
pub struct SearchCriteria {
    /// `None` selects every job of the pipeline.
    pub wanted_names: Option<BTreeSet<String>>,
    pub states: Option<Vec<JobStatus>>,
}

impl SearchCriteria {
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wanted_names: Some(names.into_iter().map(Into::into).collect()),
            states: None,
        }
    }

    #[must_use]
    pub fn with_states(mut self, states: Vec<JobStatus>) -> Self {
        self.states = Some(states);
        self
    }
}

/// Job ID to job name, for the jobs whose artifacts are wanted.
pub type SelectedJobs = HashMap<u64, String>;

/// Artifact archive of one job, held in memory until written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBlob {
    pub job_name: String,
    pub content: Vec<u8>,
}

impl ArtifactBlob {
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// `<job name>.zip`, with path separators replaced so the file always
    /// lands directly in the destination folder.
    pub fn file_name(&self) -> String {
        let name: String = self
            .job_name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        format!("{name}.zip")
    }
}

/// An artifact that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    pub job_name: String,
    pub path: PathBuf,
    pub size: usize,
}
