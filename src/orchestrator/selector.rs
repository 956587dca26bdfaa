use log::{debug, info, warn};
use tokio::task::JoinSet;

use super::types::{PipelineHandle, SearchCriteria, SelectedJobs};
use crate::error::{CiArtifactsError, Result};
use crate::providers::SharedGateway;

/// Paging and side-effect policy of a job search.
#[derive(Debug, Clone, Copy)]
pub struct FindJobsOptions {
    pub page_size: usize,
    /// Cancel every job of the pipeline whose name is not wanted.
    pub cancel_unneeded_jobs: bool,
}

/// Find the jobs of `pipeline` matching `criteria`.
///
/// Pages through the job list until a page comes back empty, or until every
/// wanted name has been matched. When a name appears on several jobs the first
/// one listed wins. Cancellations requested on the way are awaited before
/// returning; their failures are logged and never fail the search.
///
/// # Errors
///
/// - `NoMatchingJobs` when names were wanted and none matched
/// - `IncompleteMatch` when only some of the wanted names matched
/// - any gateway error raised while listing jobs
pub async fn find_jobs(
    gateway: &SharedGateway,
    pipeline: &PipelineHandle,
    criteria: &SearchCriteria,
    options: FindJobsOptions,
) -> Result<SelectedJobs> {
    let mut cancellations = JoinSet::new();

    let scanned = scan_jobs(gateway, pipeline, criteria, options, &mut cancellations).await;

    while let Some(joined) = cancellations.join_next().await {
        if let Err(e) = joined {
            warn!("Job cancellation task did not complete: {e}");
        }
    }

    check_selection(pipeline.id(), criteria, scanned?)
}

async fn scan_jobs(
    gateway: &SharedGateway,
    pipeline: &PipelineHandle,
    criteria: &SearchCriteria,
    options: FindJobsOptions,
    cancellations: &mut JoinSet<()>,
) -> Result<SelectedJobs> {
    let project_id = pipeline.project_id();
    let mut selected = SelectedJobs::new();
    let mut page = 1;

    loop {
        let jobs = gateway
            .list_pipeline_jobs(
                &project_id,
                pipeline.id(),
                page,
                options.page_size,
                criteria.states.as_deref(),
            )
            .await?;

        if jobs.is_empty() {
            break;
        }

        let Some(wanted) = &criteria.wanted_names else {
            selected.extend(jobs.into_iter().map(|job| (job.id, job.name)));
            page += 1;
            continue;
        };

        for job in jobs {
            if wanted.contains(&job.name) {
                if selected.values().any(|name| *name == job.name) {
                    debug!(
                        "Ignoring job {} ('{}'), an earlier job with that name was selected",
                        job.id, job.name
                    );
                    continue;
                }
                selected.insert(job.id, job.name);
            } else if options.cancel_unneeded_jobs {
                let gateway = SharedGateway::clone(gateway);
                let project_id = project_id.clone();
                cancellations.spawn(async move {
                    match gateway.cancel_job(&project_id, job.id).await {
                        Ok(()) => info!("Job '{}' was canceled", job.name),
                        Err(e) => warn!("Failed to cancel job '{}': {e}", job.name),
                    }
                });
            }
        }

        if selected.len() == wanted.len() {
            break;
        }
        page += 1;
    }

    Ok(selected)
}

fn check_selection(
    pipeline_id: u64,
    criteria: &SearchCriteria,
    selected: SelectedJobs,
) -> Result<SelectedJobs> {
    let Some(wanted) = &criteria.wanted_names else {
        return Ok(selected);
    };

    if selected.is_empty() {
        return Err(CiArtifactsError::NoMatchingJobs {
            pipeline_id,
            wanted: wanted.iter().cloned().collect(),
        });
    }

    if selected.len() < wanted.len() {
        let missing = wanted
            .iter()
            .filter(|name| !selected.values().any(|found| found == *name))
            .cloned()
            .collect();
        return Err(CiArtifactsError::IncompleteMatch {
            pipeline_id,
            found: selected,
            missing,
        });
    }

    Ok(selected)
}
