use std::io;
use std::path::Path;
use tokio::fs;
use tracing::trace;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Delete everything inside `dir`, leaving `dir` itself in place.
///
/// Entries are visited children-first so a directory is only removed once
/// it is empty. Symlinks are unlinked, never followed. The first failed
/// removal aborts the whole cleanup.
///
/// Returns the number of removed files and directories.
pub async fn clear_directory(dir: &Path) -> Result<usize> {
    let mut removed = 0;

    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| Error::Cleanup {
            path: e.path().unwrap_or(dir).to_path_buf(),
            source: io::Error::from(e),
        })?;

        let path = entry.path();
        let result = if entry.file_type().is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        };
        result.map_err(|source| Error::Cleanup {
            path: path.to_path_buf(),
            source,
        })?;

        trace!(path = %path.display(), "removed");
        removed += 1;
    }

    Ok(removed)
}
