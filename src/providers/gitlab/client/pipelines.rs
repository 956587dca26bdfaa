use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use super::core::GitLabClient;
use crate::error::Result;
use crate::orchestrator::types::JobStatus;

#[derive(Debug, Serialize)]
struct CreatePipelineRequest<'a> {
    #[serde(rename = "ref")]
    ref_: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variables: Vec<PipelineVariable<'a>>,
}

#[derive(Debug, Serialize)]
struct PipelineVariable<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Deserialize)]
struct PipelineRecord {
    id: u64,
}

impl GitLabClient {
    /// Create a pipeline on `branch`, passing `variables` in insertion order.
    pub async fn trigger_pipeline(
        &self,
        project_id: &str,
        branch: &str,
        variables: &IndexMap<String, String>,
    ) -> Result<u64> {
        let url = self.project_url(project_id, "pipeline")?;
        let body = CreatePipelineRequest {
            ref_: branch,
            variables: variables
                .iter()
                .map(|(key, value)| PipelineVariable { key, value })
                .collect(),
        };

        let pipeline: PipelineRecord = self
            .send(|client| client.post(url.clone()).json(&body))
            .await?
            .json()
            .await?;

        debug!("Created pipeline {} on {project_id}@{branch}", pipeline.id);
        Ok(pipeline.id)
    }

    /// One page of a branch's pipelines, newest first.
    pub async fn fetch_pipelines(
        &self,
        project_id: &str,
        branch: &str,
        page: usize,
        per_page: usize,
        status: Option<&JobStatus>,
    ) -> Result<Vec<u64>> {
        let url = self.project_url(project_id, "pipelines")?;

        let mut query = vec![
            ("ref", branch.to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("order_by", "id".to_string()),
            ("sort", "desc".to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }

        let pipelines: Vec<PipelineRecord> = self
            .send(|client| client.get(url.clone()).query(&query))
            .await?
            .json()
            .await?;

        debug!(
            "Fetched {} pipelines of {project_id}@{branch} (page {page})",
            pipelines.len()
        );
        Ok(pipelines.into_iter().map(|pipeline| pipeline.id).collect())
    }
}
