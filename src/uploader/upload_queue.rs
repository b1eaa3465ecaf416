use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::UploadConfig;
use crate::errors::{AppError, AppResult};

use super::destination::{Destination, DestinationRef, FileHandle};
use super::progress_tracker::*;

/// One file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTask {
    pub path: PathBuf,
    pub retry_count: u32,
}

impl UploadTask {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            retry_count: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.retry_count + 1
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_path: PathBuf,
    pub handle: FileHandle,
    pub attempts: u32,
}

/// Result of a single attempt
#[derive(Debug)]
pub enum TaskOutcome {
    Uploaded(UploadedFile),
    Retry(UploadTask),
    Failed(FailedUpload),
}

/// Terminal outcome sent from a worker to the collector.
type FinishedTask = Result<UploadedFile, FailedUpload>;

/// Upload one file: size check first, then hand it to the destination.
///
/// Destination errors are wrapped as `TransientUpload`; an oversized file is
/// rejected with `FileTooLarge` and the destination is not called.
pub async fn upload_single_file(
    destination: &dyn Destination,
    path: &Path,
    config: &UploadConfig,
) -> AppResult<FileHandle> {
    let size_bytes = tokio::fs::metadata(path).await?.len();
    if size_bytes > config.size_limit_bytes() {
        return Err(AppError::file_too_large(
            path,
            size_bytes,
            config.size_limit_megabytes,
        ));
    }

    destination
        .add_file_by_local_path(path)
        .await
        .map_err(|e| AppError::transient(path, &e))
}

/// Run one attempt, turning a panic in the destination into a retryable error.
async fn attempt_upload(
    destination: &dyn Destination,
    path: &Path,
    config: &UploadConfig,
) -> AppResult<FileHandle> {
    match AssertUnwindSafe(upload_single_file(destination, path, config))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("Destination panicked on {}: {}", path.display(), reason);

            Err(AppError::TransientUpload {
                path: path.display().to_string(),
                reason: format!("destination panicked: {}", reason),
            })
        }
    }
}

/// Level for a failed attempt: `warn` in verbose mode, `debug` otherwise.
pub fn attempt_log_level(verbose: bool) -> log::Level {
    if verbose {
        log::Level::Warn
    } else {
        log::Level::Debug
    }
}

fn log_attempt_error(task: &UploadTask, error: &AppError, verbose: bool) {
    log::log!(
        attempt_log_level(verbose),
        "Attempt {} for {} failed: {}",
        task.attempts(),
        task.path.display(),
        error
    );
}

/// Decide what happens to a task after an attempt.
pub fn classify_attempt(
    task: UploadTask,
    result: AppResult<FileHandle>,
    config: &UploadConfig,
    allow_retry: bool,
) -> TaskOutcome {
    match result {
        Ok(handle) => TaskOutcome::Uploaded(UploadedFile {
            attempts: task.attempts(),
            file_path: task.path,
            handle,
        }),
        Err(e) => {
            log_attempt_error(&task, &e, config.verbose);

            if allow_retry && !e.is_permanent() && config.retry.can_retry(task.retry_count) {
                return TaskOutcome::Retry(UploadTask {
                    retry_count: task.retry_count + 1,
                    ..task
                });
            }

            TaskOutcome::Failed(FailedUpload {
                file_path: task.path,
                error: e.to_string(),
                retry_count: task.retry_count,
                is_retryable: !e.is_permanent(),
            })
        }
    }
}

/// Reduces terminal outcomes into the final lists and keeps progress current.
pub(crate) struct OutcomeCollector {
    pending: HashSet<PathBuf>,
    uploaded: Vec<UploadedFile>,
    failed: Vec<FailedUpload>,
    progress_state: ProgressState,
    session_id: String,
    total: usize,
    start_time: Instant,
}

impl OutcomeCollector {
    pub fn new(files: &[PathBuf], progress_state: ProgressState, session_id: &str) -> Self {
        start_session(&progress_state, session_id, files.len());

        Self {
            pending: files.iter().cloned().collect(),
            uploaded: Vec::new(),
            failed: Vec::new(),
            progress_state,
            session_id: session_id.to_string(),
            total: files.len(),
            start_time: Instant::now(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn record(&mut self, finished: FinishedTask) {
        match finished {
            Ok(uploaded) => {
                if !self.pending.remove(&uploaded.file_path) {
                    log::warn!(
                        "Ignoring repeated outcome for {}",
                        uploaded.file_path.display()
                    );
                    return;
                }
                update_progress_success(
                    &self.progress_state,
                    &self.session_id,
                    uploaded.file_path.clone(),
                );
                self.uploaded.push(uploaded);
            }
            Err(failure) => {
                if !self.pending.remove(&failure.file_path) {
                    log::warn!(
                        "Ignoring repeated outcome for {}",
                        failure.file_path.display()
                    );
                    return;
                }
                log::warn!(
                    "Giving up on {}: {}",
                    failure.file_path.display(),
                    failure.error
                );
                update_progress_failure(&self.progress_state, &self.session_id, failure.clone());
                self.failed.push(failure);
            }
        }

        update_time_estimate(
            &self.progress_state,
            &self.session_id,
            self.start_time,
            self.total - self.pending.len(),
            self.total,
        );
    }

    /// Close the session. Files still pending are recorded as cancelled.
    pub fn finish(mut self, cancelled: bool) -> (Vec<UploadedFile>, Vec<FailedUpload>) {
        let mut remaining: Vec<PathBuf> = self.pending.drain().collect();
        remaining.sort();

        for path in remaining {
            let failure = FailedUpload {
                error: AppError::upload_cancelled(&path).to_string(),
                file_path: path,
                retry_count: 0,
                is_retryable: true,
            };
            update_progress_failure(&self.progress_state, &self.session_id, failure.clone());
            self.failed.push(failure);
        }

        if cancelled {
            mark_session_cancelled(&self.progress_state, &self.session_id);
        } else {
            mark_session_completed(&self.progress_state, &self.session_id);
        }

        (self.uploaded, self.failed)
    }
}

/// Upload files one by one, a single attempt each.
pub(crate) async fn run_sequential(
    destination: DestinationRef,
    files: Vec<PathBuf>,
    config: &UploadConfig,
    cancel: &CancellationToken,
    collector: &mut OutcomeCollector,
) {
    for path in files {
        if cancel.is_cancelled() {
            log::info!("Sequential upload cancelled");
            break;
        }

        let task = UploadTask::new(path);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Sequential upload cancelled during {}", task.path.display());
                break;
            }
            result = attempt_upload(destination.as_ref(), &task.path, config) => result,
        };

        match classify_attempt(task, result, config, false) {
            TaskOutcome::Uploaded(uploaded) => collector.record(Ok(uploaded)),
            TaskOutcome::Failed(failure) => collector.record(Err(failure)),
            TaskOutcome::Retry(task) => {
                log::error!("Unexpected retry for {} in sequential mode", task.path.display());
            }
        }
    }
}

/// Bounded queue shared by the workers. Retries go back in through `push`.
#[derive(Clone)]
struct WorkQueue {
    tx: mpsc::Sender<UploadTask>,
    rx: Arc<Mutex<mpsc::Receiver<UploadTask>>>,
}

impl WorkQueue {
    /// Capacity of `files.len()` means a retry never waits for room: a task
    /// is only pushed back after it has been taken out.
    fn filled_with(files: Vec<PathBuf>) -> AppResult<Self> {
        let (tx, rx) = mpsc::channel(files.len().max(1));
        for path in files {
            tx.try_send(UploadTask::new(path))
                .map_err(|e| AppError::Internal(format!("Upload queue rejected task: {}", e)))?;
        }

        Ok(Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        })
    }

    async fn next(&self) -> Option<UploadTask> {
        self.rx.lock().await.recv().await
    }

    async fn push(&self, task: UploadTask) -> AppResult<()> {
        self.tx
            .send(task)
            .await
            .map_err(|_| AppError::Internal("Upload queue closed".to_string()))
    }
}

async fn run_worker(
    worker_id: usize,
    destination: DestinationRef,
    queue: WorkQueue,
    results: mpsc::Sender<FinishedTask>,
    config: UploadConfig,
    shutdown: CancellationToken,
) {
    loop {
        let task = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            task = queue.next() => match task {
                Some(task) => task,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                log::debug!("[worker {}] Abandoning {}", worker_id, task.path.display());
                break;
            }
            result = attempt_upload(destination.as_ref(), &task.path, &config) => result,
        };

        let finished = match classify_attempt(task, result, &config, true) {
            TaskOutcome::Retry(task) => {
                let delay = config.retry.backoff_delay(task.retry_count);
                log::debug!(
                    "[worker {}] Requeueing {} (retry {} of {}) in {:?}",
                    worker_id,
                    task.path.display(),
                    task.retry_count,
                    config.retry.max_retries,
                    delay
                );

                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = sleep(delay) => {}
                    }
                }

                if let Err(e) = queue.push(task).await {
                    log::error!("[worker {}] {}", worker_id, e);
                    break;
                }
                continue;
            }
            TaskOutcome::Uploaded(uploaded) => Ok(uploaded),
            TaskOutcome::Failed(failure) => Err(failure),
        };

        if results.send(finished).await.is_err() {
            break;
        }
    }

    log::debug!("[worker {}] Stopped", worker_id);
}

/// Upload files with a pool of `config.max_workers` workers.
///
/// Returns once every file has a terminal outcome or `cancel` fires.
pub(crate) async fn run_parallel(
    destination: DestinationRef,
    files: Vec<PathBuf>,
    config: &UploadConfig,
    cancel: &CancellationToken,
    collector: &mut OutcomeCollector,
) -> AppResult<()> {
    let worker_count = config.max_workers.clamp(1, files.len().max(1));
    let (result_tx, mut result_rx) = mpsc::channel(files.len().max(1));
    let queue = WorkQueue::filled_with(files)?;
    let shutdown = cancel.child_token();

    log::info!("Starting {} upload workers", worker_count);

    let mut workers = JoinSet::new();
    for worker_id in 0..worker_count {
        workers.spawn(run_worker(
            worker_id,
            destination.clone(),
            queue.clone(),
            result_tx.clone(),
            config.clone(),
            shutdown.clone(),
        ));
    }
    drop(result_tx);
    drop(queue);

    while !collector.is_done() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Parallel upload cancelled");
                break;
            }
            finished = result_rx.recv() => match finished {
                Some(finished) => collector.record(finished),
                None => {
                    log::error!("All upload workers stopped with files still pending");
                    break;
                }
            },
        }
    }

    shutdown.cancel();
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            log::error!("Upload worker failed: {}", e);
        }
    }

    // Outcomes that raced with cancellation still count
    while let Ok(finished) = result_rx.try_recv() {
        collector.record(finished);
    }

    Ok(())
}
