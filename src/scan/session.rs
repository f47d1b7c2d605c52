//! Timestamped work directories with a retention policy.

use crate::errors::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

/// Session directory names sort chronologically.
const DIR_FORMAT: &str = "%Y-%m-%d--%H-%M-%S";

#[derive(Debug, Clone)]
pub struct ScanSession {
    path: PathBuf,
    created_at: DateTime<Local>,
}

impl ScanSession {
    /// Purge old sessions under `root`, then create a fresh one.
    pub fn create<P: AsRef<Path>>(root: P, retention: usize) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root)?;
        enforce_retention(root, retention)?;

        let created_at = Local::now();
        let base = created_at.format(DIR_FORMAT).to_string();
        let mut path = root.join(&base);
        let mut suffix = 1;
        while path.exists() {
            path = root.join(format!("{}-{}", base, suffix));
            suffix += 1;
        }

        fs::create_dir(&path)?;
        log::info!("Session directory {:?}", path);
        Ok(Self { path, created_at })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    /// Create (if needed) and return a directory inside the session.
    pub fn subdir<P: AsRef<Path>>(&self, relative: P) -> Result<PathBuf> {
        let dir = self.path.join(relative);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Remove the oldest entries of `root` (by name) while more than `retention`
/// remain. Returns the removed paths.
pub fn enforce_retention(root: &Path, retention: usize) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    let excess = entries.len().saturating_sub(retention);
    let removed: Vec<PathBuf> = entries.into_iter().take(excess).collect();
    for path in &removed {
        if path.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        log::info!("Removed old session {:?}", path);
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(root: &Path, count: usize) {
        for i in 0..count {
            fs::create_dir_all(root.join(format!("2020-01-01--00-00-{:02}", i))).unwrap();
        }
    }

    fn count(root: &Path) -> usize {
        fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn test_eleven_sessions_drop_oldest() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), 11);

        let session = ScanSession::create(dir.path(), 10).unwrap();
        assert!(session.path().is_dir());
        assert!(!dir.path().join("2020-01-01--00-00-00").exists());
        assert!(dir.path().join("2020-01-01--00-00-01").exists());
        assert_eq!(count(dir.path()), 11);
    }

    #[test]
    fn test_under_limit_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), 10);
        assert!(enforce_retention(dir.path(), 10).unwrap().is_empty());
        assert_eq!(count(dir.path()), 10);
    }

    #[test]
    fn test_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tmp").join("stitch");
        let session = ScanSession::create(&root, 10).unwrap();
        assert!(session.path().starts_with(&root));
    }

    #[test]
    fn test_same_second_sessions_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let a = ScanSession::create(dir.path(), 10).unwrap();
        let b = ScanSession::create(dir.path(), 10).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn test_subdir() {
        let dir = tempfile::tempdir().unwrap();
        let session = ScanSession::create(dir.path(), 10).unwrap();
        let tile = session.subdir(Path::new("1").join("2")).unwrap();
        assert!(tile.is_dir());
        assert!(tile.ends_with("1/2"));
    }
}
