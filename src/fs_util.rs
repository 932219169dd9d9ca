use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const OWNER_ONLY_FILE_MODE: u32 = 0o600;
pub const PUBLIC_FILE_MODE: u32 = 0o644;
pub const SECRETS_DIR_MODE: u32 = 0o700;
pub const PUBLIC_DIR_MODE: u32 = 0o755;

/// Creates `path` (and parents) and applies `mode` to the leaf directory.
///
/// # Errors
/// Returns an error if the directory cannot be created or permissions cannot be set.
pub async fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(())
}

/// Writes `contents` so that only the owner can read it. The mode is applied
/// at creation, so the data is never visible with a wider mode.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub async fn write_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, OWNER_ONLY_FILE_MODE, false).await
}

/// Like [`write_owner_only`] but fails if `path` already exists.
///
/// # Errors
/// Returns an error if the file exists or cannot be written.
pub async fn create_owner_only(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, OWNER_ONLY_FILE_MODE, true).await
}

/// Writes world-readable public material such as certificates.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub async fn write_public(path: &Path, contents: &[u8]) -> Result<()> {
    write_with_mode(path, contents, PUBLIC_FILE_MODE, false).await
}

async fn write_with_mode(path: &Path, contents: &[u8], mode: u32, create_new: bool) -> Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).mode(mode);
    if create_new {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }
    let mut file = options
        .open(path)
        .await
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    file.write_all(contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("Failed to flush {}", path.display()))?;
    // An existing file keeps its old mode on open; force the intended one.
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    Ok(())
}

/// Returns the permission bits of `path`.
///
/// # Errors
/// Returns an error if the metadata cannot be read.
pub async fn file_mode(path: &Path) -> Result<u32> {
    let metadata = fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(metadata.permissions().mode() & 0o777)
}
