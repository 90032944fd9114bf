pub mod backup;

pub use backup::{backup_sibling, is_backup_path, BackupOutcome, BackupVault};

use anyhow::Context;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Compute the ledger scope for a configuration file.
/// scope_id = blake3(normalized file name) → hex string (first 16 chars).
///
/// Only the file name participates, so the same configuration checked out at a
/// different absolute path (another machine, another CI runner) maps to the same
/// scope, while two configuration files side by side never share one.
pub fn scope_id(config_path: &Path) -> String {
    let normalized = normalize_file_name(config_path);
    let hash = blake3::hash(normalized.as_bytes());
    hash.to_hex()[..16].to_string()
}

fn normalize_file_name(p: &Path) -> String {
    let name = p
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| p.to_string_lossy().to_string());
    // Lowercase on Windows for consistency
    #[cfg(windows)]
    let name = name.to_lowercase();
    name.trim().to_string()
}

/// Atomic write: write to temp file in same dir, then rename.
///
/// An existing target keeps its permissions; a new file gets the temp file's
/// (owner-only) mode.
pub fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let permissions = fs::metadata(path).ok().map(|m| m.permissions());
    write_with_permissions(path, data, permissions)
}

/// Atomically copy `src` over `dst`, carrying `src`'s permissions along.
pub fn copy_atomic(src: &Path, dst: &Path) -> anyhow::Result<()> {
    let bytes = fs::read(src).with_context(|| format!("reading {}", src.display()))?;
    let permissions = fs::metadata(src)
        .with_context(|| format!("reading metadata of {}", src.display()))?
        .permissions();
    write_with_permissions(dst, &bytes, Some(permissions))
}

fn write_with_permissions(
    path: &Path,
    data: &[u8],
    permissions: Option<fs::Permissions>,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_id_is_deterministic() {
        let id1 = scope_id(Path::new("/ci/runner-a/doodlify.json"));
        let id2 = scope_id(Path::new("/home/me/checkout/doodlify.json"));
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 16);
        assert!(id1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_config_files_get_different_scopes() {
        let a = scope_id(Path::new("config.json"));
        let b = scope_id(Path::new("config.staging.json"));
        assert_ne!(a, b);
    }

    #[test]
    fn write_atomic_creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("test.txt");
        write_atomic(&path, b"hello world").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello world");
    }

    #[test]
    fn write_atomic_replaces_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ledger.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let entries = fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[test]
    fn write_atomic_keeps_existing_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.sh");
        fs::write(&path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();

        write_atomic(&path, b"#!/bin/sh\necho hi\n").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn copy_atomic_carries_source_mode() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("hero.png");
        fs::write(&src, "png").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o644)).unwrap();

        let dst = tmp.path().join("hero.original.png");
        copy_atomic(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"png");
        let mode = fs::metadata(&dst).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
