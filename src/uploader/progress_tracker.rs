use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FailedUpload {
    pub file_path: PathBuf,
    pub error: String,
    pub retry_count: u32,
    pub is_retryable: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UploadProgress {
    pub total_files: usize,
    pub completed: usize,
    pub successful_uploads: Vec<PathBuf>,
    pub failed_uploads: Vec<FailedUpload>,
    pub session_status: String, // "active", "completed", "cancelled"
    pub estimated_time_remaining: Option<u64>, // seconds
}

impl UploadProgress {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            completed: 0,
            successful_uploads: Vec::new(),
            failed_uploads: Vec::new(),
            session_status: "active".to_string(),
            estimated_time_remaining: None,
        }
    }
}

/// Progress snapshots keyed by session id
pub type ProgressState = Arc<Mutex<HashMap<String, UploadProgress>>>;

pub fn new_progress_state() -> ProgressState {
    Arc::new(Mutex::new(HashMap::new()))
}

fn safe_progress_update<F>(
    progress_state: &ProgressState,
    session_id: &str,
    operation: &str,
    f: F,
) -> bool
where
    F: FnOnce(&mut UploadProgress),
{
    match progress_state.lock() {
        Ok(mut progress) => {
            if let Some(session_progress) = progress.get_mut(session_id) {
                f(session_progress);
                true
            } else {
                log::warn!(
                    "Session {} not found for {} operation",
                    session_id,
                    operation
                );
                false
            }
        }
        Err(e) => {
            log::error!(
                "Failed to acquire progress lock for {} in session {} (non-critical): {}",
                operation,
                session_id,
                e
            );
            false
        }
    }
}

/// Register a new session with `total_files` pending files.
pub fn start_session(progress_state: &ProgressState, session_id: &str, total_files: usize) {
    match progress_state.lock() {
        Ok(mut progress) => {
            progress.insert(session_id.to_string(), UploadProgress::new(total_files));
        }
        Err(e) => {
            log::error!(
                "Failed to register session {} (non-critical): {}",
                session_id,
                e
            );
        }
    }
}

/// Snapshot of a session's progress.
pub fn get_progress(progress_state: &ProgressState, session_id: &str) -> Option<UploadProgress> {
    match progress_state.lock() {
        Ok(progress) => progress.get(session_id).cloned(),
        Err(e) => {
            log::error!("Failed to read progress for session {}: {}", session_id, e);
            None
        }
    }
}

pub fn session_ids(progress_state: &ProgressState) -> Vec<String> {
    progress_state
        .lock()
        .map(|progress| progress.keys().cloned().collect())
        .unwrap_or_default()
}

/// Drop a session and return its final snapshot.
pub fn remove_session(progress_state: &ProgressState, session_id: &str) -> Option<UploadProgress> {
    match progress_state.lock() {
        Ok(mut progress) => progress.remove(session_id),
        Err(e) => {
            log::error!("Failed to remove session {} (non-critical): {}", session_id, e);
            None
        }
    }
}

/// Drop every session that is no longer active. Returns how many were removed.
pub fn cleanup_finished_sessions(progress_state: &ProgressState) -> usize {
    match progress_state.lock() {
        Ok(mut progress) => {
            let before = progress.len();
            progress.retain(|_, session| session.session_status == "active");
            let removed = before - progress.len();
            if removed > 0 {
                log::debug!("Cleaned up {} finished upload sessions", removed);
            }
            removed
        }
        Err(e) => {
            log::error!("Failed to clean up upload sessions (non-critical): {}", e);
            0
        }
    }
}

pub fn update_progress_success(progress_state: &ProgressState, session_id: &str, file_path: PathBuf) {
    safe_progress_update(progress_state, session_id, "success update", |progress| {
        progress.completed += 1;
        log::debug!(
            "Progress: uploaded {} ({}/{})",
            file_path.display(),
            progress.completed,
            progress.total_files
        );
        progress.successful_uploads.push(file_path);
    });
}

pub fn update_progress_failure(progress_state: &ProgressState, session_id: &str, failure: FailedUpload) {
    safe_progress_update(progress_state, session_id, "failure update", |progress| {
        progress.completed += 1;
        log::debug!(
            "Progress: failed {} - {} ({}/{})",
            failure.file_path.display(),
            failure.error,
            progress.completed,
            progress.total_files
        );
        progress.failed_uploads.push(failure);
    });
}

pub fn update_time_estimate(
    progress_state: &ProgressState,
    session_id: &str,
    start_time: Instant,
    completed: usize,
    total: usize,
) {
    if completed == 0 {
        return;
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    let rate = completed as f64 / elapsed.max(f64::EPSILON);
    let remaining = total.saturating_sub(completed);
    let estimated_seconds = (remaining as f64 / rate) as u64;

    safe_progress_update(progress_state, session_id, "time estimate update", |progress| {
        progress.estimated_time_remaining = Some(estimated_seconds);
    });
}

pub fn mark_session_completed(progress_state: &ProgressState, session_id: &str) {
    safe_progress_update(progress_state, session_id, "mark completed", |progress| {
        progress.session_status = "completed".to_string();
        progress.estimated_time_remaining = Some(0);

        log::info!(
            "Session {} completed: {}/{} successful, {} failed",
            session_id,
            progress.successful_uploads.len(),
            progress.total_files,
            progress.failed_uploads.len()
        );
    });
}

pub fn mark_session_cancelled(progress_state: &ProgressState, session_id: &str) {
    safe_progress_update(progress_state, session_id, "mark cancelled", |progress| {
        progress.session_status = "cancelled".to_string();
        progress.estimated_time_remaining = Some(0);
        log::info!(
            "Marked session {} as cancelled with {} completed uploads",
            session_id,
            progress.successful_uploads.len()
        );
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let state = new_progress_state();
        start_session(&state, "s1", 2);

        update_progress_success(&state, "s1", PathBuf::from("a.txt"));
        update_progress_failure(
            &state,
            "s1",
            FailedUpload {
                file_path: PathBuf::from("b.txt"),
                error: "boom".to_string(),
                retry_count: 3,
                is_retryable: true,
            },
        );
        mark_session_completed(&state, "s1");

        let progress = get_progress(&state, "s1").unwrap();
        assert_eq!(progress.completed, 2);
        assert_eq!(progress.successful_uploads, vec![PathBuf::from("a.txt")]);
        assert_eq!(progress.failed_uploads.len(), 1);
        assert_eq!(progress.session_status, "completed");
        assert_eq!(session_ids(&state), vec!["s1".to_string()]);
    }

    #[test]
    fn test_unknown_session_is_ignored() {
        let state = new_progress_state();
        update_progress_success(&state, "missing", PathBuf::from("a.txt"));
        mark_session_cancelled(&state, "missing");
        assert!(get_progress(&state, "missing").is_none());
    }

    #[test]
    fn test_finished_sessions_are_cleaned_up() {
        let state = new_progress_state();
        start_session(&state, "done", 1);
        start_session(&state, "stopped", 1);
        start_session(&state, "running", 1);
        mark_session_completed(&state, "done");
        mark_session_cancelled(&state, "stopped");

        assert_eq!(cleanup_finished_sessions(&state), 2);
        assert_eq!(session_ids(&state), vec!["running".to_string()]);

        let removed = remove_session(&state, "running").unwrap();
        assert_eq!(removed.total_files, 1);
        assert!(session_ids(&state).is_empty());
        assert!(remove_session(&state, "running").is_none());
    }
}
