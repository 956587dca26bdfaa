use log::debug;

use super::core::GitLabClient;
use crate::error::Result;
use crate::orchestrator::types::{JobDescriptor, JobStatus};

impl GitLabClient {
    /// One page of a pipeline's jobs, optionally restricted to `scope` statuses.
    pub async fn fetch_pipeline_jobs(
        &self,
        project_id: &str,
        pipeline_id: u64,
        page: usize,
        per_page: usize,
        scope: Option<&[JobStatus]>,
    ) -> Result<Vec<JobDescriptor>> {
        let url = self.project_url(project_id, &format!("pipelines/{pipeline_id}/jobs"))?;

        let mut query = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        query.extend(
            scope
                .unwrap_or_default()
                .iter()
                .map(|status| ("scope[]", status.to_string())),
        );

        let jobs: Vec<JobDescriptor> = self
            .send(|client| client.get(url.clone()).query(&query))
            .await?
            .json()
            .await?;

        debug!(
            "Fetched {} jobs of pipeline {pipeline_id} (page {page})",
            jobs.len()
        );
        Ok(jobs)
    }

    pub async fn fetch_job(&self, project_id: &str, job_id: u64) -> Result<JobDescriptor> {
        let url = self.project_url(project_id, &format!("jobs/{job_id}"))?;

        Ok(self
            .send(|client| client.get(url.clone()))
            .await?
            .json()
            .await?)
    }

    pub async fn cancel(&self, project_id: &str, job_id: u64) -> Result<()> {
        let url = self.project_url(project_id, &format!("jobs/{job_id}/cancel"))?;

        self.send(|client| client.post(url.clone())).await?;
        Ok(())
    }

    /// Raw artifacts archive of a job.
    pub async fn download_job_artifacts(&self, project_id: &str, job_id: u64) -> Result<Vec<u8>> {
        let url = self.project_url(project_id, &format!("jobs/{job_id}/artifacts"))?;

        let bytes = self
            .send(|client| client.get(url.clone()))
            .await?
            .bytes()
            .await?;

        debug!("Downloaded {} bytes of artifacts for job {job_id}", bytes.len());
        Ok(bytes.to_vec())
    }
}
