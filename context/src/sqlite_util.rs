//! Secure on-disk SQLite setup shared by the feed store.
//!
//! The store directory is tightened to owner-only (0o700) when we own it, and
//! the database plus its `-wal` / `-shm` sidecars are kept at 0o600.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create parent directories, tighten permissions and open the database.
pub(crate) fn open_secure_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        ensure_private_dir(parent)?;
    }
    ensure_private_db_file(path)?;
    let db = Connection::open(path)
        .with_context(|| format!("Failed to open feed store at {}", path.display()))?;
    tighten_sidecars(path);
    Ok(db)
}

fn ensure_private_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::{MetadataExt, PermissionsExt};

        let metadata = fs::metadata(dir)
            .with_context(|| format!("Failed to read directory metadata: {}", dir.display()))?;
        // Shared directories we merely write into are left alone.
        let uid = unsafe { libc::getuid() };
        if metadata.uid() == uid && metadata.permissions().mode() & 0o077 != 0 {
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700)).with_context(|| {
                format!("Failed to set directory permissions: {}", dir.display())
            })?;
        }
    }
    Ok(())
}

fn ensure_private_db_file(path: &Path) -> Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(false).read(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(path)
        .with_context(|| format!("Failed to create database file: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set database permissions: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn tighten_sidecars(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(path, suffix);
        if sidecar.exists()
            && let Err(err) = fs::set_permissions(&sidecar, fs::Permissions::from_mode(0o600))
        {
            tracing::warn!(path = %sidecar.display(), %err, "could not tighten sqlite sidecar");
        }
    }
}

#[cfg(not(unix))]
fn tighten_sidecars(_path: &Path) {}

#[cfg_attr(not(unix), allow(dead_code))]
fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    match path.file_name() {
        Some(name) => path.with_file_name(format!("{}{suffix}", name.to_string_lossy())),
        None => PathBuf::from(format!("{}{suffix}", path.display())),
    }
}
