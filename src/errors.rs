use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not a directory: {path}")]
    InvalidArgument { path: String },

    #[error("No files found under {path}")]
    NoFilesFound { path: String },

    #[error("File too large: {path} ({size_bytes} bytes). Maximum size is {limit_megabytes}MB.")]
    FileTooLarge {
        path: String,
        size_bytes: u64,
        limit_megabytes: u64,
    },

    #[error("Upload of {path} failed: {reason}")]
    TransientUpload { path: String, reason: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Upload of {path} cancelled")]
    UploadCancelled { path: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_argument(path: &Path) -> Self {
        Self::InvalidArgument {
            path: path.display().to_string(),
        }
    }

    pub fn no_files_found(path: &Path) -> Self {
        Self::NoFilesFound {
            path: path.display().to_string(),
        }
    }

    pub fn file_too_large(path: &Path, size_bytes: u64, limit_megabytes: u64) -> Self {
        Self::FileTooLarge {
            path: path.display().to_string(),
            size_bytes,
            limit_megabytes,
        }
    }

    /// Wrap any destination error as a retryable per-file failure.
    pub fn transient(path: &Path, source: &AppError) -> Self {
        Self::TransientUpload {
            path: path.display().to_string(),
            reason: source.to_string(),
        }
    }

    pub fn upload_cancelled(path: &Path) -> Self {
        Self::UploadCancelled {
            path: path.display().to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Network(_)
                | AppError::TransientUpload { .. }
                | AppError::UploadFailed { .. }
                | AppError::Io(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::InvalidArgument { .. }
                | AppError::NoFilesFound { .. }
                | AppError::FileTooLarge { .. }
                | AppError::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_size_limit_is_permanent() {
        let err = AppError::file_too_large(&PathBuf::from("/data/c.txt"), 10, 1);
        assert!(err.is_permanent());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_keeps_reason() {
        let inner = AppError::UploadFailed {
            reason: "503 Service Unavailable".to_string(),
        };
        let err = AppError::transient(&PathBuf::from("/data/b.txt"), &inner);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("/data/b.txt"));
    }

    #[test]
    fn test_cancelled_is_neither_class() {
        let err = AppError::upload_cancelled(&PathBuf::from("a.txt"));
        assert!(!err.is_retryable());
        assert!(!err.is_permanent());
    }
}
