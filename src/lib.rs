//! Bulk upload of local directory trees to Materials Commons projects.

pub mod config;
pub mod errors;
pub mod security;
pub mod uploader;

pub use errors::{AppError, AppResult};
pub use uploader::{bulk_upload, BulkUploader, Destination, FileHandle, UploadReport};
