//! Timestamped copies of the registry file.

use crate::error::{Error, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

const BACKUP_PREFIX: &str = "servers_backup_";
const BACKUP_SUFFIX: &str = ".json";

/// Copy the registry file to `servers_backup_YYYYMMDD_HHMMSS.json` next to it.
pub fn create_backup(registry_path: &Path) -> Result<PathBuf> {
    if !registry_path.exists() {
        return Err(Error::PersistenceFailure(format!(
            "Nothing to back up, {} does not exist",
            registry_path.display()
        )));
    }

    let name = format!(
        "{}{}{}",
        BACKUP_PREFIX,
        Local::now().format("%Y%m%d_%H%M%S"),
        BACKUP_SUFFIX
    );
    let backup = registry_path.with_file_name(name);

    fs::copy(registry_path, &backup)
        .map_err(|e| Error::PersistenceFailure(format!("Failed to create backup: {}", e)))?;
    tracing::info!(backup = ?backup, "Created registry backup");
    Ok(backup)
}

/// Backups found in `dir`, newest first.
pub fn list_backups(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(Error::PersistenceFailure(format!(
                "Failed to list backups: {}",
                e
            )));
        }
    };

    let mut backups: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
        })
        .collect();

    // The timestamp format sorts lexically.
    backups.sort();
    backups.reverse();
    Ok(backups)
}

/// Replace the registry file with a backup.
///
/// The backup is parsed first so a damaged copy never overwrites a good
/// registry.
pub fn restore_backup(backup: &Path, registry_path: &Path) -> Result<()> {
    let content = fs::read_to_string(backup)
        .map_err(|e| Error::PersistenceFailure(format!("Failed to read backup: {}", e)))?;
    crate::registry::JsonFileStore::parse_from_str(&content)?;

    fs::copy(backup, registry_path)
        .map_err(|e| Error::PersistenceFailure(format!("Failed to restore backup: {}", e)))?;
    tracing::info!(backup = ?backup, "Restored registry from backup");
    Ok(())
}
