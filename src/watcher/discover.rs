//! Chat log discovery
//!
//! The chat client starts a new log file per session. The active source is
//! the matching file with the newest creation time; platforms without a
//! creation time fall back to the modification time.

use crate::error::SourceError;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Check if a file name looks like a chat log
pub fn matches_source(path: &Path, pattern: &str, extension: &str) -> bool {
    let name_matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.contains(pattern))
        .unwrap_or(false);
    let ext_matches = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(extension))
        .unwrap_or(false);
    name_matches && ext_matches
}

/// Creation time, or modification time where creation time is unavailable
pub fn creation_time(path: &Path) -> std::io::Result<SystemTime> {
    let metadata = std::fs::metadata(path)?;
    metadata.created().or_else(|_| metadata.modified())
}

/// All matching files in `dir` with their creation times
pub fn list_sources(
    dir: &Path,
    pattern: &str,
    extension: &str,
) -> Result<Vec<(PathBuf, SystemTime)>, SourceError> {
    if !dir.is_dir() {
        return Err(SourceError::DirectoryMissing(dir.to_path_buf()));
    }

    let mut sources = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                tracing::debug!("Skipping unreadable entry in {:?}: {}", dir, e);
                continue;
            }
        };
        if !path.is_file() || !matches_source(&path, pattern, extension) {
            continue;
        }
        match creation_time(&path) {
            Ok(created) => sources.push((path, created)),
            Err(e) => tracing::debug!("Cannot stat {:?}: {}", path, e),
        }
    }

    Ok(sources)
}

/// Find the newest matching chat log in `dir`
pub fn find_latest_source(
    dir: &Path,
    pattern: &str,
    extension: &str,
) -> Result<PathBuf, SourceError> {
    list_sources(dir, pattern, extension)?
        .into_iter()
        // Ties broken by name so the choice is stable
        .max_by(|(a_path, a_time), (b_path, b_time)| {
            a_time.cmp(b_time).then_with(|| a_path.cmp(b_path))
        })
        .map(|(path, _)| path)
        .ok_or_else(|| SourceError::NoSource {
            dir: dir.to_path_buf(),
            pattern: pattern.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    const PATTERN: &str = "用户发言记录";

    #[test]
    fn test_matches_source() {
        assert!(matches_source(Path::new("2025-08-29_用户发言记录.txt"), PATTERN, "txt"));
        assert!(matches_source(Path::new("/logs/用户发言记录_1.TXT"), PATTERN, "txt"));
        assert!(!matches_source(Path::new("用户发言记录.log"), PATTERN, "txt"));
        assert!(!matches_source(Path::new("other.txt"), PATTERN, "txt"));
    }

    #[test]
    fn test_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");
        let err = find_latest_source(&missing, PATTERN, "txt").unwrap_err();
        assert!(matches!(err, SourceError::DirectoryMissing(_)));
    }

    #[test]
    fn test_no_matching_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), "x").unwrap();
        let err = find_latest_source(temp.path(), PATTERN, "txt").unwrap_err();
        assert!(matches!(err, SourceError::NoSource { .. }));
    }

    #[test]
    fn test_newest_file_wins() {
        let temp = TempDir::new().unwrap();
        let old = temp.path().join("a_用户发言记录.txt");
        let new = temp.path().join("b_用户发言记录.txt");

        std::fs::write(&old, "old").unwrap();
        // Creation timestamps need to differ on coarse filesystems
        std::thread::sleep(Duration::from_millis(50));
        std::fs::write(&new, "new").unwrap();
        std::fs::write(temp.path().join("c_other.txt"), "ignored").unwrap();

        assert_eq!(find_latest_source(temp.path(), PATTERN, "txt").unwrap(), new);
        assert_eq!(list_sources(temp.path(), PATTERN, "txt").unwrap().len(), 2);
    }

    #[test]
    fn test_directories_are_ignored() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("dir_用户发言记录.txt")).unwrap();
        assert!(find_latest_source(temp.path(), PATTERN, "txt").is_err());
    }
}
