//! Directory and symlink maintenance for mirror entities.

use std::path::Path;

use crate::error::Result;

/// Ensure a directory exists, creating parents as needed.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await?;
    Ok(())
}

/// Create (or re-point) a symlink at `link` targeting `target`.
///
/// An existing link is replaced so renames of the target directory are
/// followed; a real directory at the link path is left untouched and
/// reported as an error by the create call.
pub async fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    if tokio::fs::symlink_metadata(link)
        .await
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
    {
        tokio::fs::remove_file(link).await?;
    }

    #[cfg(unix)]
    tokio::fs::symlink(target, link).await?;
    #[cfg(windows)]
    tokio::fs::symlink_dir(target, link).await?;

    Ok(())
}
