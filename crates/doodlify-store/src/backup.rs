//! Backup siblings: `<stem>.original.<ext>` next to a file, holding its
//! pre-mutation bytes.
//!
//! At most one sibling exists per file. Its presence means "this file has been
//! transformed at least once" and drives the default skip policy. Only this
//! module creates or deletes siblings.

use crate::copy_atomic;
use anyhow::{Context, Result};
use doodlify_core::DoodlifyError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const BACKUP_MARKER: &str = "original";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    Created,
    /// A sibling already existed and was left untouched.
    AlreadyPresent,
}

/// Sibling backup path: `hero.png` → `hero.original.png`, `LICENSE` → `LICENSE.original`.
pub fn backup_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let sibling = match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => format!(
            "{}.{BACKUP_MARKER}.{}",
            stem.to_string_lossy(),
            ext.to_string_lossy()
        ),
        _ => format!("{name}.{BACKUP_MARKER}"),
    };
    path.with_file_name(sibling)
}

/// True if `path` is itself a backup sibling.
pub fn is_backup_path(path: &Path) -> bool {
    let marker = format!(".{BACKUP_MARKER}");
    let stem_marked = path
        .file_stem()
        .map(|s| s.to_string_lossy().ends_with(&marker))
        .unwrap_or(false);
    let name_marked = path
        .file_name()
        .map(|s| s.to_string_lossy().ends_with(&marker))
        .unwrap_or(false);
    stem_marked || name_marked
}

/// Backup operations for files under a working-tree root.
#[derive(Debug, Clone)]
pub struct BackupVault {
    root: PathBuf,
}

impl BackupVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Absolute backup sibling path for a repo-relative file.
    pub fn backup_path(&self, rel: &str) -> PathBuf {
        backup_sibling(&self.resolve(rel))
    }

    pub fn has_backup(&self, rel: &str) -> bool {
        self.backup_path(rel).is_file()
    }

    /// Copy the current bytes of `rel` to its sibling. No-op when a sibling
    /// already exists.
    pub fn backup(&self, rel: &str) -> Result<BackupOutcome> {
        let sibling = self.backup_path(rel);
        if sibling.is_file() {
            debug!(file = rel, "backup already present");
            return Ok(BackupOutcome::AlreadyPresent);
        }
        let path = self.resolve(rel);
        copy_atomic(&path, &sibling)
            .with_context(|| format!("writing backup {}", sibling.display()))?;
        debug!(file = rel, backup = %sibling.display(), "backup created");
        Ok(BackupOutcome::Created)
    }

    /// Copy the sibling back over `rel`, then delete the sibling.
    pub fn restore(&self, rel: &str) -> Result<()> {
        let sibling = self.backup_path(rel);
        if !sibling.is_file() {
            return Err(DoodlifyError::BackupMissing {
                path: PathBuf::from(rel),
            }
            .into());
        }
        let path = self.resolve(rel);
        copy_atomic(&sibling, &path).with_context(|| format!("restoring {}", path.display()))?;
        fs::remove_file(&sibling)
            .with_context(|| format!("removing backup {}", sibling.display()))?;
        debug!(file = rel, "restored from backup");
        Ok(())
    }
}
