// SPDX-License-Identifier: Apache-2.0

//! Database file backups
//!
//! A backup is a plain copy of the database file named after the source and
//! the local time: `<dir>/<stem>-<YYYYMMDD-HHMMSS>.<extension>`.

use std::path::{Path, PathBuf};

use chrono::Local;
use guard_core::{GuardError, GuardResult};
use tracing::info;

pub const DEFAULT_EXTENSION: &str = "db";

/// Picks a backup path in `dir` that does not exist yet
pub fn backup_path(source: &Path, dir: &Path, extension: &str) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database");
    let extension = extension.trim_start_matches('.');
    let stamp = Local::now().format("%Y%m%d-%H%M%S");

    let mut candidate = dir.join(format!("{}-{}.{}", stem, stamp, extension));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}-{}-{}.{}", stem, stamp, n, extension));
        n += 1;
    }
    candidate
}

/// Copies `source` into `dir`, creating `dir` if needed
pub async fn copy_database(source: &Path, dir: &Path, extension: &str) -> GuardResult<PathBuf> {
    if !source.is_file() {
        return Err(GuardError::io(format!(
            "Database file not found: {}",
            source.display()
        )));
    }

    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        GuardError::io(format!(
            "Failed to create backup directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let target = backup_path(source, dir, extension);
    let bytes = tokio::fs::copy(source, &target).await.map_err(|e| {
        GuardError::io(format!("Failed to copy {} to {}: {}", source.display(), target.display(), e))
    })?;

    info!(source = %source.display(), target = %target.display(), bytes, "Backup written");
    Ok(target)
}
