use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

/// Collect every regular file below `root`, as absolute paths.
///
/// Fails with `InvalidArgument` when `root` is not a directory and with
/// `NoFilesFound` when the walk yields nothing. Symlinks are not followed and
/// unreadable entries are skipped with a warning.
pub fn discover_files(root: &Path) -> AppResult<Vec<PathBuf>> {
    let root = InputValidator::validate_directory(root)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => log::warn!("Skipping unreadable entry under {}: {}", root.display(), e),
        }
    }

    if files.is_empty() {
        return Err(AppError::no_files_found(&root));
    }

    log::debug!("Discovered {} files under {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_walks_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("x/y/z")).unwrap();
        fs::write(dir.path().join("top.txt"), b"1").unwrap();
        fs::write(dir.path().join("x/mid.txt"), b"2").unwrap();
        fs::write(dir.path().join("x/y/z/deep.txt"), b"3").unwrap();

        let mut files = discover_files(dir.path()).unwrap();
        files.sort();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.is_absolute()));
        assert!(files.iter().any(|p| p.ends_with("x/y/z/deep.txt")));
    }

    #[test]
    fn test_only_directories_counts_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir_all(dir.path().join("c")).unwrap();

        assert!(matches!(
            discover_files(dir.path()),
            Err(AppError::NoFilesFound { .. })
        ));
    }

    #[test]
    fn test_file_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("single.txt");
        fs::write(&file, b"x").unwrap();

        assert!(matches!(
            discover_files(&file),
            Err(AppError::InvalidArgument { .. })
        ));
    }
}
