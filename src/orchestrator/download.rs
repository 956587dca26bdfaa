use log::{info, warn};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};

use super::types::{ArtifactBlob, PipelineHandle, SavedArtifact, SelectedJobs};
use crate::error::{CiArtifactsError, Result};
use crate::providers::SharedGateway;

type DownloadResult = std::result::Result<Result<SavedArtifact>, JoinError>;

/// Write an artifact to `<folder>/<job name>.zip`, replacing any existing file.
///
/// The folder is created when missing.
pub async fn write_artifact(folder: &Path, blob: ArtifactBlob) -> Result<SavedArtifact> {
    let path = folder.join(blob.file_name());
    let size = blob.len();

    let written = async {
        tokio::fs::create_dir_all(folder).await?;
        tokio::fs::write(&path, &blob.content).await
    };
    written
        .await
        .map_err(|e| CiArtifactsError::download(&blob.job_name, e.into()))?;

    info!(
        "Saved artifact of job '{}' to {} ({size} bytes)",
        blob.job_name,
        path.display()
    );
    Ok(SavedArtifact {
        job_name: blob.job_name,
        path,
        size,
    })
}

/// Fetch and write the artifact of every selected job concurrently.
///
/// All transfers run to completion even when one fails; the first failure
/// observed is returned. Files already written are kept.
pub async fn download_all(
    gateway: &SharedGateway,
    pipeline: &PipelineHandle,
    selected: &SelectedJobs,
    folder: &Path,
) -> Result<Vec<SavedArtifact>> {
    let project_id = pipeline.project_id();
    let mut tasks = JoinSet::new();

    for (&job_id, job_name) in selected {
        let gateway = SharedGateway::clone(gateway);
        let project_id = project_id.clone();
        let folder = folder.to_path_buf();
        let job_name = job_name.clone();

        tasks.spawn(async move {
            let content = gateway
                .get_job_artifact(&project_id, job_id)
                .await
                .map_err(|e| CiArtifactsError::download(&job_name, e))?;
            write_artifact(&folder, ArtifactBlob { job_name, content }).await
        });
    }

    let mut saved = Vec::with_capacity(selected.len());
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        record(joined, &mut saved, |e| failures.push(e));
    }

    match failures.into_iter().next() {
        Some(first) => Err(first),
        None => Ok(saved),
    }
}

/// Write artifacts as they arrive on `artifacts`, each in its own task.
///
/// Returns once the channel is closed and every write has finished. Failures
/// are pushed to `failures` as soon as they happen.
pub async fn download_stream(
    mut artifacts: mpsc::Receiver<ArtifactBlob>,
    folder: PathBuf,
    failures: mpsc::UnboundedSender<CiArtifactsError>,
) -> Vec<SavedArtifact> {
    let mut tasks = JoinSet::new();
    let mut saved = Vec::new();
    let report = |e: CiArtifactsError| {
        // The receiver only goes away once the run is over.
        let _ = failures.send(e);
    };

    loop {
        tokio::select! {
            received = artifacts.recv() => match received {
                Some(blob) => {
                    let folder = folder.clone();
                    tasks.spawn(async move { write_artifact(&folder, blob).await });
                }
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                record(joined, &mut saved, report);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        record(joined, &mut saved, report);
    }

    saved
}

fn record(
    joined: DownloadResult,
    saved: &mut Vec<SavedArtifact>,
    mut on_failure: impl FnMut(CiArtifactsError),
) {
    match joined {
        Ok(Ok(artifact)) => saved.push(artifact),
        Ok(Err(e)) => {
            warn!("{e}");
            on_failure(e);
        }
        Err(e) => on_failure(CiArtifactsError::TaskFailed {
            task: "artifact download".to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::PipelineSpec;
    use crate::providers::fake::FakeGateway;
    use indexmap::IndexMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn pipeline() -> PipelineHandle {
        PipelineSpec {
            project: "group".to_string(),
            repository: "repo".to_string(),
            branch: "main".to_string(),
            variables: IndexMap::new(),
        }
        .resolve(42)
    }

    fn blob(name: &str, content: &[u8]) -> ArtifactBlob {
        ArtifactBlob {
            job_name: name.to_string(),
            content: content.to_vec(),
        }
    }

    fn selected(jobs: &[(u64, &str)]) -> SelectedJobs {
        jobs.iter()
            .map(|(id, name)| (*id, (*name).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_write_artifact_creates_zip_named_after_job() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("nested").join("out");

        let saved = write_artifact(&folder, blob("build", b"PK-build"))
            .await
            .unwrap();

        assert_eq!(saved.path, folder.join("build.zip"));
        assert_eq!(saved.size, 8);
        assert_eq!(std::fs::read(&saved.path).unwrap(), b"PK-build");
    }

    #[tokio::test]
    async fn test_write_artifact_truncates_existing_file() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("build.zip"), b"a much longer old archive").unwrap();

        write_artifact(temp_dir.path(), blob("build", b"new"))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read(temp_dir.path().join("build.zip")).unwrap(),
            b"new"
        );
    }

    #[tokio::test]
    async fn test_write_artifact_stays_inside_folder() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("out");

        let saved = write_artifact(&folder, blob("../../escape", b"zip"))
            .await
            .unwrap();

        assert_eq!(saved.path, folder.join(".._.._escape.zip"));
        assert!(saved.path.exists());
        assert!(!temp_dir.path().join("escape.zip").exists());
    }

    #[tokio::test]
    async fn test_write_failure_is_a_download_error() {
        let temp_dir = TempDir::new().unwrap();
        let not_a_folder = temp_dir.path().join("file");
        std::fs::write(&not_a_folder, b"").unwrap();

        let err = write_artifact(&not_a_folder, blob("build", b"zip"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CiArtifactsError::Download { ref job, ref source }
                if job == "build" && matches!(**source, CiArtifactsError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_download_all_writes_every_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(
            FakeGateway::new()
                .with_artifact(1, b"build-zip")
                .with_artifact(2, b"test-zip"),
        );
        let gateway: SharedGateway = fake.clone();

        let saved = download_all(
            &gateway,
            &pipeline(),
            &selected(&[(1, "build"), (2, "test")]),
            temp_dir.path(),
        )
        .await;

        assert_eq!(assert_ok!(saved).len(), 2);
        assert_eq!(
            std::fs::read(temp_dir.path().join("build.zip")).unwrap(),
            b"build-zip"
        );
        assert_eq!(
            std::fs::read(temp_dir.path().join("test.zip")).unwrap(),
            b"test-zip"
        );
    }

    #[tokio::test]
    async fn test_download_all_keeps_going_after_a_failure() {
        let temp_dir = TempDir::new().unwrap();
        // job 2 has no artifact, so its fetch fails
        let fake = Arc::new(FakeGateway::new().with_artifact(1, b"build-zip"));
        let gateway: SharedGateway = fake.clone();

        let result = download_all(
            &gateway,
            &pipeline(),
            &selected(&[(1, "build"), (2, "test")]),
            temp_dir.path(),
        )
        .await;

        let err = assert_err!(result);
        assert!(matches!(err, CiArtifactsError::Download { ref job, .. } if job == "test"));
        assert!(temp_dir.path().join("build.zip").exists());
        assert!(!temp_dir.path().join("test.zip").exists());
    }

    #[tokio::test]
    async fn test_download_stream_writes_until_channel_closes() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel(4);
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(download_stream(
            rx,
            temp_dir.path().to_path_buf(),
            failures_tx,
        ));
        tx.send(blob("build", b"1")).await.unwrap();
        tx.send(blob("test", b"22")).await.unwrap();
        drop(tx);

        let mut saved = writer.await.unwrap();
        saved.sort_by(|a, b| a.job_name.cmp(&b.job_name));

        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].job_name, "build");
        assert_eq!(saved[1].size, 2);
        assert!(failures_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_download_stream_reports_write_failures() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("test.zip")).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();

        tx.send(blob("build", b"1")).await.unwrap();
        tx.send(blob("test", b"2")).await.unwrap();
        drop(tx);
        let saved = download_stream(rx, temp_dir.path().to_path_buf(), failures_tx).await;

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].job_name, "build");
        let failure = failures_rx.try_recv().unwrap();
        assert!(matches!(failure, CiArtifactsError::Download { ref job, .. } if job == "test"));
    }
}
