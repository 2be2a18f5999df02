use crate::error::ListError;
use crate::lock::ListGuard;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BACKUP_MARKER: &str = ".bak.";
const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Copies a list's bytes to `<list>.bak.<YYYYMMDDHHMMSS>` before it is rewritten.
///
/// Stamps have one-second resolution: two snapshots of the same list within a second
/// share a name and the later one wins.
#[derive(Debug, Clone, Default)]
pub struct BackupManager;

impl BackupManager {
    pub fn new() -> Self {
        Self
    }

    /// Snapshots the locked file. `Ok(None)` when there is nothing to back up yet.
    pub fn snapshot(&self, guard: &ListGuard) -> crate::Result<Option<PathBuf>> {
        let path = guard.path();
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ListError::io(format!("read {} for backup", path.display()), e)),
        };

        let backup_path = Self::backup_path(path, &Local::now().format(STAMP_FORMAT).to_string());
        fs::write(&backup_path, &bytes)
            .map_err(|e| ListError::io(format!("write backup {}", backup_path.display()), e))?;
        debug!("Backed up {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(backup_path))
    }

    pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(BACKUP_MARKER);
        name.push(stamp);
        path.with_file_name(name)
    }

    /// Backups of `path`, oldest first.
    pub fn list_backups(&self, path: &Path) -> crate::Result<Vec<PathBuf>> {
        let (Some(dir), Some(file_name)) = (path.parent(), path.file_name()) else {
            return Ok(Vec::new());
        };
        let prefix = format!("{}{}", file_name.to_string_lossy(), BACKUP_MARKER);

        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ListError::io(format!("list {}", dir.display()), e)),
        };

        let mut backups: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path())
            .collect();
        backups.sort();
        Ok(backups)
    }
}
