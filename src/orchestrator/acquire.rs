use log::{debug, info};
use tokio::time::Instant;

use super::selector::{find_jobs, FindJobsOptions};
use super::types::{JobStatus, PipelineHandle, SelectedJobs};
use crate::config::RunConfig;
use crate::error::{CiArtifactsError, Result};
use crate::providers::SharedGateway;

/// Resolve the pipeline to take artifacts from, together with its wanted jobs.
///
/// With `force_trigger` a new pipeline is created on the configured branch.
/// Otherwise the branch's successful pipelines are scanned newest first, up to
/// `pipelines_limit`, and the first one containing every wanted job wins.
///
/// # Errors
///
/// - `Timeout` when `deadline` passes first, whichever strategy is active
/// - `NoSuitablePipeline` when the scan finds no complete match
/// - selector errors for a triggered pipeline and any gateway error
pub async fn acquire_pipeline_jobs(
    gateway: &SharedGateway,
    config: &RunConfig,
    deadline: Instant,
) -> Result<(PipelineHandle, SelectedJobs)> {
    let budget = deadline.saturating_duration_since(Instant::now());

    let acquisition = async {
        if config.force_trigger {
            trigger_new_pipeline(gateway, config).await
        } else {
            scan_finished_pipelines(gateway, config).await
        }
    };

    tokio::time::timeout_at(deadline, acquisition)
        .await
        .map_err(|_| CiArtifactsError::Timeout {
            operation: "acquiring pipeline jobs".to_string(),
            after: budget,
        })?
}

async fn trigger_new_pipeline(
    gateway: &SharedGateway,
    config: &RunConfig,
) -> Result<(PipelineHandle, SelectedJobs)> {
    let spec = config.pipeline_spec();

    info!("Triggering new pipeline on branch '{}'...", spec.branch);
    let id = gateway
        .create_pipeline(&spec.project_id(), &spec.branch, &spec.variables)
        .await?;
    info!("Pipeline {id} was created");

    let pipeline = spec.resolve(id);
    if !pipeline.variables().is_empty() {
        let keys: Vec<&str> = pipeline.variables().keys().map(String::as_str).collect();
        debug!("Pipeline {id} runs with variables {}", keys.join(", "));
    }
    // Jobs of a fresh pipeline have no terminal status yet, so no scope.
    let selected = find_jobs(
        gateway,
        &pipeline,
        &config.search_criteria(),
        FindJobsOptions {
            page_size: config.page_size,
            cancel_unneeded_jobs: config.cancel_unneeded_jobs,
        },
    )
    .await?;

    Ok((pipeline, selected))
}

async fn scan_finished_pipelines(
    gateway: &SharedGateway,
    config: &RunConfig,
) -> Result<(PipelineHandle, SelectedJobs)> {
    let spec = config.pipeline_spec();
    let project_id = spec.project_id();
    let criteria = config
        .search_criteria()
        .with_states(vec![JobStatus::Success]);
    let options = FindJobsOptions {
        page_size: config.page_size,
        cancel_unneeded_jobs: false,
    };

    info!(
        "Searching for the latest suitable pipeline on branch '{}' (limit: {})...",
        spec.branch, config.pipelines_limit
    );

    let mut scanned = 0;
    let mut page = 1;

    'pages: while scanned < config.pipelines_limit {
        let ids = gateway
            .list_pipelines(
                &project_id,
                &spec.branch,
                page,
                config.page_size,
                Some(&JobStatus::Success),
            )
            .await?;

        if ids.is_empty() {
            debug!("Pipeline history of '{}' exhausted", spec.branch);
            break;
        }

        for id in ids {
            if scanned >= config.pipelines_limit {
                break 'pages;
            }
            scanned += 1;

            let pipeline = spec.clone().resolve(id);
            match find_jobs(gateway, &pipeline, &criteria, options).await {
                Ok(selected) => {
                    info!("Using pipeline {id}");
                    return Ok((pipeline, selected));
                }
                Err(
                    e @ (CiArtifactsError::NoMatchingJobs { .. }
                    | CiArtifactsError::IncompleteMatch { .. }),
                ) => debug!("Skipping pipeline {id}: {e}"),
                Err(e) => return Err(e),
            }
        }

        page += 1;
    }

    Err(CiArtifactsError::NoSuitablePipeline {
        branch: spec.branch,
        scanned,
    })
}
