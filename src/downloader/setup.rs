//! Pre-flight steps of a batch: nothing here touches the network.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Folder a manifest's series are written to: `<output_root>/<manifest file name>`
pub fn destination_folder(manifest_path: &Path, output_root: &Path) -> Result<PathBuf> {
    let name = manifest_path
        .file_name()
        .ok_or_else(|| Error::ManifestNotFound(manifest_path.to_path_buf()))?;
    Ok(output_root.join(name))
}

/// Fail unless `manifest_path` is an existing regular file
pub(super) async fn validate_manifest_path(manifest_path: &Path) -> Result<()> {
    match tokio::fs::metadata(manifest_path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(Error::ManifestNotFound(manifest_path.to_path_buf())),
    }
}

/// Create the destination folder and any missing parents
pub(super) async fn prepare_destination(destination: &Path) -> Result<()> {
    tokio::fs::create_dir_all(destination).await?;
    Ok(())
}

/// Copy the manifest into the destination folder
///
/// Returns the path of the copy. When the manifest already lives at that path it is
/// left untouched.
pub(super) async fn archive_manifest(manifest_path: &Path, destination: &Path) -> Result<PathBuf> {
    let name = manifest_path
        .file_name()
        .ok_or_else(|| Error::ManifestNotFound(manifest_path.to_path_buf()))?;
    let copy = destination.join(name);

    if let (Ok(src), Ok(dst)) = (
        tokio::fs::canonicalize(manifest_path).await,
        tokio::fs::canonicalize(&copy).await,
    ) && src == dst
    {
        return Ok(copy);
    }

    tokio::fs::copy(manifest_path, &copy).await?;
    tracing::debug!(from = %manifest_path.display(), to = %copy.display(), "Archived manifest");
    Ok(copy)
}
