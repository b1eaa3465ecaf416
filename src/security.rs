use crate::errors::{AppError, AppResult};
use regex::Regex;
use std::path::{Path, PathBuf};

pub struct InputValidator;

impl InputValidator {
    /// Check the upload root and return it as an absolute path.
    pub fn validate_directory(path: &Path) -> AppResult<PathBuf> {
        if path.as_os_str().is_empty() || !path.is_dir() {
            return Err(AppError::invalid_argument(path));
        }

        Ok(std::fs::canonicalize(path)?)
    }

    pub fn validate_api_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("mcurl", "API URL cannot be empty"));
        }

        let url_pattern = Regex::new(r"^https?://[A-Za-z0-9.\-]+(:\d{1,5})?(/[\w\-./]*)?$")
            .map_err(|e| AppError::Internal(e.to_string()))?;

        if !url_pattern.is_match(trimmed) {
            return Err(AppError::validation("mcurl", "API URL must be an http(s) URL"));
        }

        if trimmed.len() > 500 {
            return Err(AppError::validation("mcurl", "API URL too long"));
        }

        Ok(())
    }

    pub fn validate_api_key(key: &str) -> AppResult<()> {
        let trimmed = key.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation(
                "apikey",
                "API key is missing. Set MC_API_KEY or add it to the config file",
            ));
        }

        let key_pattern =
            Regex::new(r"^[A-Za-z0-9\-_]+$").map_err(|e| AppError::Internal(e.to_string()))?;
        if !key_pattern.is_match(trimmed) {
            return Err(AppError::validation("apikey", "API key contains invalid characters"));
        }

        Ok(())
    }

    pub fn validate_project_id(project_id: &str) -> AppResult<()> {
        let trimmed = project_id.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("project_id", "Project id cannot be empty"));
        }

        // Numeric ids and uuids are both in use
        let id_pattern =
            Regex::new(r"^[A-Za-z0-9\-]{1,64}$").map_err(|e| AppError::Internal(e.to_string()))?;
        if !id_pattern.is_match(trimmed) {
            return Err(AppError::validation("project_id", "Project id contains invalid characters"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_validation() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"data").unwrap();

        let resolved = InputValidator::validate_directory(dir.path()).unwrap();
        assert!(resolved.is_absolute());

        assert!(matches!(
            InputValidator::validate_directory(&file),
            Err(AppError::InvalidArgument { .. })
        ));
        assert!(matches!(
            InputValidator::validate_directory(&dir.path().join("missing")),
            Err(AppError::InvalidArgument { .. })
        ));
        assert!(InputValidator::validate_directory(Path::new("")).is_err());
    }

    #[test]
    fn test_api_url_validation() {
        assert!(InputValidator::validate_api_url("https://materialscommons.org/api").is_ok());
        assert!(InputValidator::validate_api_url("http://localhost:8000/api/").is_ok());
        assert!(InputValidator::validate_api_url("ftp://example.com").is_err());
        assert!(InputValidator::validate_api_url("").is_err());
    }

    #[test]
    fn test_key_and_project_validation() {
        assert!(InputValidator::validate_api_key("abc123-_").is_ok());
        assert!(InputValidator::validate_api_key("   ").is_err());
        assert!(InputValidator::validate_api_key("abc def").is_err());

        assert!(InputValidator::validate_project_id("42").is_ok());
        assert!(InputValidator::validate_project_id("5e1b2c3d-aaaa-bbbb-cccc-000000000000").is_ok());
        assert!(InputValidator::validate_project_id("../etc").is_err());
    }
}
