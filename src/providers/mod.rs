pub mod gitlab;

#[cfg(test)]
pub mod fake;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::Result;
use crate::orchestrator::types::{JobDescriptor, JobStatus};

/// Remote CI operations the orchestrator relies on.
///
/// `project_id` is the path-style identifier (`group/repo`). Pages are 1-based.
#[async_trait]
pub trait CiGateway: Send + Sync {
    async fn create_pipeline(
        &self,
        project_id: &str,
        branch: &str,
        variables: &IndexMap<String, String>,
    ) -> Result<u64>;

    async fn list_pipeline_jobs(
        &self,
        project_id: &str,
        pipeline_id: u64,
        page: usize,
        per_page: usize,
        scope: Option<&[JobStatus]>,
    ) -> Result<Vec<JobDescriptor>>;

    async fn get_job(&self, project_id: &str, job_id: u64) -> Result<JobDescriptor>;

    async fn cancel_job(&self, project_id: &str, job_id: u64) -> Result<()>;

    /// Pipeline IDs of a branch, most recent first.
    async fn list_pipelines(
        &self,
        project_id: &str,
        branch: &str,
        page: usize,
        per_page: usize,
        status: Option<&JobStatus>,
    ) -> Result<Vec<u64>>;

    async fn get_job_artifact(&self, project_id: &str, job_id: u64) -> Result<Vec<u8>>;
}

/// Gateway shared between the orchestrator's concurrent tasks.
pub type SharedGateway = Arc<dyn CiGateway>;
