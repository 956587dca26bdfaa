//! Scripted in-memory gateway for orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;

use super::CiGateway;
use crate::error::{CiArtifactsError, Result};
use crate::orchestrator::types::{JobDescriptor, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreatePipeline {
        branch: String,
        variables: Vec<(String, String)>,
    },
    ListPipelineJobs {
        pipeline_id: u64,
        page: usize,
    },
    GetJob(u64),
    CancelJob(u64),
    ListPipelines {
        page: usize,
    },
    GetJobArtifact(u64),
}

#[derive(Default)]
pub struct FakeGateway {
    created_pipeline: Option<u64>,
    pipelines: Vec<u64>,
    pipeline_jobs: HashMap<u64, Vec<JobDescriptor>>,
    statuses: Mutex<HashMap<u64, VecDeque<JobStatus>>>,
    artifacts: HashMap<u64, Vec<u8>>,
    failing_cancels: HashSet<u64>,
    failing_job_listings: HashSet<u64>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Call>>,
}

fn not_found(what: &str) -> CiArtifactsError {
    CiArtifactsError::ApiError {
        status: 404,
        message: format!("{what} not found"),
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_created_pipeline(mut self, id: u64) -> Self {
        self.created_pipeline = Some(id);
        self
    }

    /// Branch history, newest first.
    pub fn with_pipelines(mut self, ids: &[u64]) -> Self {
        self.pipelines = ids.to_vec();
        self
    }

    pub fn with_jobs(mut self, pipeline_id: u64, jobs: &[(u64, &str, &str)]) -> Self {
        let jobs = jobs
            .iter()
            .map(|(id, name, status)| JobDescriptor {
                id: *id,
                name: (*name).to_string(),
                status: JobStatus::from(*status),
            })
            .collect();
        self.pipeline_jobs.insert(pipeline_id, jobs);
        self
    }

    /// Statuses returned by successive `get_job` calls; the last one repeats.
    pub fn with_status_sequence(self, job_id: u64, statuses: &[&str]) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(job_id, statuses.iter().map(|s| JobStatus::from(*s)).collect());
        self
    }

    pub fn with_artifact(mut self, job_id: u64, content: &[u8]) -> Self {
        self.artifacts.insert(job_id, content.to_vec());
        self
    }

    pub fn with_failing_cancel(mut self, job_id: u64) -> Self {
        self.failing_cancels.insert(job_id);
        self
    }

    pub fn with_failing_job_listing(mut self, pipeline_id: u64) -> Self {
        self.failing_job_listings.insert(pipeline_id);
        self
    }

    /// Delay applied to every call before it answers.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn job_pages_requested(&self, pipeline_id: u64) -> Vec<usize> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ListPipelineJobs {
                    pipeline_id: id,
                    page,
                } if id == pipeline_id => Some(page),
                _ => None,
            })
            .collect()
    }

    pub fn cancelled_jobs(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CancelJob(id) => Some(id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    async fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn find_job(&self, job_id: u64) -> Option<&JobDescriptor> {
        self.pipeline_jobs
            .values()
            .flatten()
            .find(|job| job.id == job_id)
    }
}

fn page_of<T: Clone>(items: &[T], page: usize, per_page: usize) -> Vec<T> {
    items
        .iter()
        .skip(page.saturating_sub(1) * per_page)
        .take(per_page)
        .cloned()
        .collect()
}

#[async_trait]
impl CiGateway for FakeGateway {
    async fn create_pipeline(
        &self,
        _project_id: &str,
        branch: &str,
        variables: &IndexMap<String, String>,
    ) -> Result<u64> {
        self.record(Call::CreatePipeline {
            branch: branch.to_string(),
            variables: variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
        .await;
        self.created_pipeline.ok_or(CiArtifactsError::ApiError {
            status: 400,
            message: "reference not found".to_string(),
        })
    }

    async fn list_pipeline_jobs(
        &self,
        _project_id: &str,
        pipeline_id: u64,
        page: usize,
        per_page: usize,
        scope: Option<&[JobStatus]>,
    ) -> Result<Vec<JobDescriptor>> {
        self.record(Call::ListPipelineJobs { pipeline_id, page }).await;
        if self.failing_job_listings.contains(&pipeline_id) {
            return Err(CiArtifactsError::ApiError {
                status: 500,
                message: "internal error".to_string(),
            });
        }

        let jobs: Vec<JobDescriptor> = self
            .pipeline_jobs
            .get(&pipeline_id)
            .into_iter()
            .flatten()
            .filter(|job| scope.map_or(true, |scope| scope.contains(&job.status)))
            .cloned()
            .collect();
        Ok(page_of(&jobs, page, per_page))
    }

    async fn get_job(&self, _project_id: &str, job_id: u64) -> Result<JobDescriptor> {
        self.record(Call::GetJob(job_id)).await;
        let mut job = self
            .find_job(job_id)
            .cloned()
            .ok_or_else(|| not_found("job"))?;

        let mut statuses = self.statuses.lock().unwrap();
        if let Some(sequence) = statuses.get_mut(&job_id) {
            let next = if sequence.len() > 1 {
                sequence.pop_front()
            } else {
                sequence.front().cloned()
            };
            if let Some(status) = next {
                job.status = status;
            }
        }
        Ok(job)
    }

    async fn cancel_job(&self, _project_id: &str, job_id: u64) -> Result<()> {
        self.record(Call::CancelJob(job_id)).await;
        if self.failing_cancels.contains(&job_id) {
            return Err(CiArtifactsError::ApiError {
                status: 403,
                message: "forbidden".to_string(),
            });
        }
        Ok(())
    }

    async fn list_pipelines(
        &self,
        _project_id: &str,
        _branch: &str,
        page: usize,
        per_page: usize,
        _status: Option<&JobStatus>,
    ) -> Result<Vec<u64>> {
        self.record(Call::ListPipelines { page }).await;
        Ok(page_of(&self.pipelines, page, per_page))
    }

    async fn get_job_artifact(&self, _project_id: &str, job_id: u64) -> Result<Vec<u8>> {
        self.record(Call::GetJobArtifact(job_id)).await;
        self.artifacts
            .get(&job_id)
            .cloned()
            .ok_or_else(|| not_found("artifact"))
    }
}
