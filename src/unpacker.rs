//! H5P package → directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::info;

use crate::cleanup::clear_directory;
use crate::error::{Error, OpenMode, Result};
use crate::io::LocalFileReader;
use crate::zip::{ZipError, ZipExtractor};

/// Outcome of a successful unpack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackReport {
    pub destination: PathBuf,
    /// File entries written
    pub entries: usize,
    /// Whether an existing destination was emptied first
    pub cleaned: bool,
}

/// Observations emitted while unpacking.
#[derive(Debug, Clone, Copy)]
pub enum UnpackEvent<'a> {
    /// An existing destination was emptied
    Cleaned { destination: &'a Path, removed: usize },
    /// The destination is ready and `entries` entries are about to be written
    Extracting { entries: usize },
}

#[derive(Default)]
pub struct Unpacker<'a> {
    observer: Option<Box<dyn FnMut(UnpackEvent<'_>) + 'a>>,
}

impl<'a> Unpacker<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive [`UnpackEvent`]s while unpacking.
    pub fn on_event(mut self, observer: impl FnMut(UnpackEvent<'_>) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn emit(&mut self, event: UnpackEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }

    /// Extract `archive` into `destination`.
    ///
    /// The archive is opened and its central directory read before the
    /// destination is touched, so a missing or corrupt archive leaves the
    /// destination as it was. An existing destination directory is emptied
    /// completely before the first entry is written; a missing one is
    /// created along with its parents.
    ///
    /// A failure during extraction leaves whatever was written so far.
    ///
    /// # Arguments
    ///
    /// * `archive` - Existing H5P package to read
    /// * `destination` - Directory to (re)populate
    ///
    /// # Returns
    ///
    /// An [`UnpackReport`] with the number of files written and whether
    /// the destination had to be emptied.
    ///
    /// # Errors
    ///
    /// * [`Error::ArchiveNotFound`] if `archive` does not exist
    /// * [`Error::ContainerOpen`] if it cannot be accessed or is not a zip
    /// * [`Error::CreateDestination`] / [`Error::Cleanup`] while preparing
    ///   the destination
    /// * [`Error::Extraction`] if an entry cannot be written
    pub async fn unpack(&mut self, archive: &Path, destination: &Path) -> Result<UnpackReport> {
        let open_error = |source: ZipError| Error::ContainerOpen {
            path: archive.to_path_buf(),
            mode: OpenMode::Read,
            source,
        };

        match fs::try_exists(archive).await {
            Ok(true) => {}
            Ok(false) => return Err(Error::ArchiveNotFound(archive.to_path_buf())),
            Err(e) => return Err(open_error(e.into())),
        }
        let reader = LocalFileReader::new(archive).map_err(|e| open_error(e.into()))?;
        let extractor = ZipExtractor::new(Arc::new(reader));
        let entries = extractor.list_files().await.map_err(open_error)?;

        let removed = prepare_destination(destination).await?;
        if let Some(removed) = removed {
            self.emit(UnpackEvent::Cleaned {
                destination,
                removed,
            });
        }
        self.emit(UnpackEvent::Extracting {
            entries: entries.len(),
        });

        let written = extractor
            .extract_entries(&entries, destination)
            .await
            .map_err(Error::Extraction)?;

        info!(
            archive = %archive.display(),
            destination = %destination.display(),
            entries = written,
            "archive extracted"
        );

        Ok(UnpackReport {
            destination: destination.to_path_buf(),
            entries: written,
            cleaned: removed.is_some(),
        })
    }
}

/// Extract `archive` into `destination`, see [`Unpacker::unpack`].
pub async fn unpack(archive: &Path, destination: &Path) -> Result<UnpackReport> {
    Unpacker::new().unpack(archive, destination).await
}

/// Make `dest` an empty directory. Returns how many objects were removed
/// when it already existed, `None` when it had to be created.
async fn prepare_destination(dest: &Path) -> Result<Option<usize>> {
    let create_error = |source: io::Error| Error::CreateDestination {
        path: dest.to_path_buf(),
        source,
    };

    match fs::metadata(dest).await {
        Ok(meta) if meta.is_dir() => {
            let removed = clear_directory(dest).await?;
            info!(destination = %dest.display(), removed, "cleaned up destination directory");
            Ok(Some(removed))
        }
        Ok(_) => Err(create_error(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(0o755);
            builder.create(dest).await.map_err(create_error)?;
            Ok(None)
        }
        Err(e) => Err(create_error(e)),
    }
}
