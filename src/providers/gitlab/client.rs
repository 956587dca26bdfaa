mod core;
mod jobs;
mod pipelines;

use async_trait::async_trait;
use indexmap::IndexMap;

pub use self::core::GitLabClient;
use crate::error::Result;
use crate::orchestrator::types::{JobDescriptor, JobStatus};
use crate::providers::CiGateway;

#[async_trait]
impl CiGateway for GitLabClient {
    async fn create_pipeline(
        &self,
        project_id: &str,
        branch: &str,
        variables: &IndexMap<String, String>,
    ) -> Result<u64> {
        self.trigger_pipeline(project_id, branch, variables).await
    }

    async fn list_pipeline_jobs(
        &self,
        project_id: &str,
        pipeline_id: u64,
        page: usize,
        per_page: usize,
        scope: Option<&[JobStatus]>,
    ) -> Result<Vec<JobDescriptor>> {
        self.fetch_pipeline_jobs(project_id, pipeline_id, page, per_page, scope)
            .await
    }

    async fn get_job(&self, project_id: &str, job_id: u64) -> Result<JobDescriptor> {
        self.fetch_job(project_id, job_id).await
    }

    async fn cancel_job(&self, project_id: &str, job_id: u64) -> Result<()> {
        self.cancel(project_id, job_id).await
    }

    async fn list_pipelines(
        &self,
        project_id: &str,
        branch: &str,
        page: usize,
        per_page: usize,
        status: Option<&JobStatus>,
    ) -> Result<Vec<u64>> {
        self.fetch_pipelines(project_id, branch, page, per_page, status)
            .await
    }

    async fn get_job_artifact(&self, project_id: &str, job_id: u64) -> Result<Vec<u8>> {
        self.download_job_artifacts(project_id, job_id).await
    }
}
