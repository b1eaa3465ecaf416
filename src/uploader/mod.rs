// Bulk uploader - walks a directory and pushes every file to a destination
//
// Per-file failures are collected into the report; only directory-level
// problems are returned as errors.

pub mod destination;
pub mod discovery;
pub mod mc_client;
pub mod progress_tracker;
pub mod retry;
pub mod upload_queue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{validate_upload_config, UploadConfig};
use crate::errors::AppResult;

pub use destination::{Destination, DestinationRef, FileHandle};
pub use mc_client::McProject;
pub use progress_tracker::{FailedUpload, ProgressState, UploadProgress};
pub use retry::RetryConfig;
pub use upload_queue::{UploadTask, UploadedFile};

use upload_queue::{run_parallel, run_sequential, OutcomeCollector};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReport {
    pub session_id: String,
    pub total_files: usize,
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<FailedUpload>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UploadReport {
    /// Paths that could not be uploaded, in no particular order.
    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failed.iter().map(|f| f.file_path.clone()).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

pub struct BulkUploader {
    config: UploadConfig,
    progress_state: ProgressState,
    cancel: CancellationToken,
}

impl BulkUploader {
    pub fn new(config: UploadConfig) -> AppResult<Self> {
        validate_upload_config(&config)?;

        Ok(Self {
            config,
            progress_state: progress_tracker::new_progress_state(),
            cancel: CancellationToken::new(),
        })
    }

    /// Use `token` to abort uploads. A cancelled token stays cancelled, so
    /// later calls on this uploader finish immediately.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn progress_state(&self) -> ProgressState {
        self.progress_state.clone()
    }

    /// Forget progress of sessions that have finished.
    pub fn clear_finished_sessions(&self) -> usize {
        progress_tracker::cleanup_finished_sessions(&self.progress_state)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Upload every regular file below `local_directory` to `destination`.
    pub async fn upload_directory(
        &self,
        destination: DestinationRef,
        local_directory: &Path,
    ) -> AppResult<UploadReport> {
        let files = discovery::discover_files(local_directory)?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let total_files = files.len();

        log::info!(
            "Session {}: uploading {} files from {} ({} mode)",
            session_id,
            total_files,
            local_directory.display(),
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let mut collector = OutcomeCollector::new(&files, self.progress_state.clone(), &session_id);

        if self.config.parallel {
            run_parallel(destination, files, &self.config, &self.cancel, &mut collector).await?;
        } else {
            run_sequential(destination, files, &self.config, &self.cancel, &mut collector).await;
        }

        let cancelled = self.cancel.is_cancelled() && !collector.is_done();
        let (uploaded, failed) = collector.finish(cancelled);

        Ok(UploadReport {
            session_id,
            total_files,
            uploaded,
            failed,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Upload a directory and return the paths that failed.
    pub async fn bulk_upload(
        &self,
        destination: DestinationRef,
        local_directory: &Path,
    ) -> AppResult<Vec<PathBuf>> {
        let report = self.upload_directory(destination, local_directory).await?;
        Ok(report.failed_paths())
    }
}

/// Upload with default settings: parallel, 10 workers, 500MB limit, 3 retries.
pub async fn bulk_upload<D>(destination: D, local_directory: &Path) -> AppResult<Vec<PathBuf>>
where
    D: Destination + 'static,
{
    BulkUploader::new(UploadConfig::default())?
        .bulk_upload(Arc::new(destination), local_directory)
        .await
}
