use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::errors::AppResult;

/// Remote file created by a destination
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileHandle {
    pub id: serde_json::Value,
    pub name: String,
    pub path: Option<String>,
    pub size: Option<u64>,
}

/// Something that accepts a local file and creates a remote copy.
///
/// Implementations are called concurrently from several workers.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn add_file_by_local_path(&self, path: &Path) -> AppResult<FileHandle>;
}

pub type DestinationRef = Arc<dyn Destination>;
