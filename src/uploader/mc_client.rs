use async_trait::async_trait;
use reqwest::{multipart, Body, Client};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

use super::destination::{Destination, FileHandle};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A Materials Commons project reached over its REST API.
///
/// Local files are placed in the remote directory that mirrors their position
/// under `local_root`.
pub struct McProject {
    client: Client,
    base_url: String,
    api_key: String,
    project_id: String,
    local_root: PathBuf,
}

impl McProject {
    pub fn new(base_url: &str, api_key: &str, project_id: &str, local_root: &Path) -> AppResult<Self> {
        InputValidator::validate_api_url(base_url)?;
        InputValidator::validate_api_key(api_key)?;
        InputValidator::validate_project_id(project_id)?;
        let local_root = InputValidator::validate_directory(local_root)?;

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            project_id: project_id.trim().to_string(),
            local_root,
        })
    }

    pub fn upload_url(&self) -> String {
        format!("{}/projects/{}/files/upload", self.base_url, self.project_id)
    }

    /// Remote directory for a local file, e.g. `/runs/day1` or `/`.
    pub fn remote_directory(&self, path: &Path) -> AppResult<String> {
        let relative = match path.strip_prefix(&self.local_root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => std::fs::canonicalize(path)?
                .strip_prefix(&self.local_root)
                .map(Path::to_path_buf)
                .map_err(|_| {
                    AppError::validation(
                        "file_path",
                        &format!(
                            "{} is outside the project root {}",
                            path.display(),
                            self.local_root.display()
                        ),
                    )
                })?,
        };

        let parts: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(name) => Some(name.to_string_lossy().to_string()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(format!("/{}", parts.join("/")))
    }

    /// Multipart form whose file part streams from disk.
    async fn build_form(&self, path: &Path) -> AppResult<multipart::Form> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        let filename = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = multipart::Part::stream_with_length(body, length)
            .file_name(filename)
            .mime_str("application/octet-stream")?;

        Ok(multipart::Form::new()
            .text("directory", self.remote_directory(path)?)
            .part("file", part))
    }
}

#[async_trait]
impl Destination for McProject {
    async fn add_file_by_local_path(&self, path: &Path) -> AppResult<FileHandle> {
        let form = self.build_form(path).await?;
        let url = self.upload_url();

        log::debug!("Uploading {} to {}", path.display(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let response_text = response.text().await?;
            let handle: FileHandle = serde_json::from_str(&response_text)?;
            return Ok(handle);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(AppError::UploadFailed {
            reason: format!(
                "Materials Commons API error {} for project {}: {}",
                status, self.project_id, error_text
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn project_for(server_uri: &str, root: &Path) -> McProject {
        McProject::new(server_uri, "test-key", "42", root).unwrap()
    }

    #[test]
    fn test_remote_directory_mirrors_layout() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("runs/day1")).unwrap();
        let project = project_for("https://materialscommons.org/api/", dir.path());
        let root = fs::canonicalize(dir.path()).unwrap();

        assert_eq!(project.remote_directory(&root.join("a.txt")).unwrap(), "/");
        assert_eq!(
            project.remote_directory(&root.join("runs/day1/b.txt")).unwrap(),
            "/runs/day1"
        );
        assert_eq!(
            project.upload_url(),
            "https://materialscommons.org/api/projects/42/files/upload"
        );
    }

    #[test]
    fn test_rejects_bad_construction() {
        let dir = tempfile::tempdir().unwrap();
        assert!(McProject::new("https://materialscommons.org/api", "", "42", dir.path()).is_err());
        assert!(McProject::new("not a url", "key", "42", dir.path()).is_err());
        assert!(McProject::new(
            "https://materialscommons.org/api",
            "key",
            "42",
            &dir.path().join("missing")
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_upload_parses_handle() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/42/files/upload"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": 7,
                "name": "sample.dat",
                "path": "/sub/sample.dat",
                "size": 5
            })))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        let file = dir.path().join("sub/sample.dat");
        fs::write(&file, b"12345").unwrap();
        let large = dir.path().join("sub/large.bin");
        let large_contents: Vec<u8> = (0..200_000u32).map(|i| b'a' + (i % 26) as u8).collect();
        fs::write(&large, &large_contents).unwrap();

        let project = project_for(&server.uri(), dir.path());
        let handle = project.add_file_by_local_path(&file).await.unwrap();

        assert_eq!(handle.id, serde_json::json!(7));
        assert_eq!(handle.name, "sample.dat");
        assert_eq!(handle.size, Some(5));

        project.add_file_by_local_path(&large).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("/sub"));
        assert!(body.contains("12345"));

        // Streamed in several chunks, still arrives whole
        let large_body = &requests[1].body;
        assert!(large_body
            .windows(large_contents.len())
            .any(|window| window == large_contents.as_slice()));
    }

    #[tokio::test]
    async fn test_server_error_becomes_upload_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("database unavailable"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();

        let project = project_for(&server.uri(), dir.path());
        let err = project.add_file_by_local_path(&file).await.unwrap_err();

        match err {
            AppError::UploadFailed { reason } => {
                assert!(reason.contains("500"));
                assert!(reason.contains("database unavailable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
