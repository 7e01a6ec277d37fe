//! Directory → H5P package.

use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, OpenMode, Result};
use crate::progress::{PackEvent, ProgressState};
use crate::zip::{CompressionMethod, DEFAULT_LEVEL, DosDateTime, ZipWriter};

/// Tunables for [`Packer`].
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    /// Deflate level, 0-9. The entry method stays deflate even at 0.
    pub compression_level: u32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
        }
    }
}

/// Outcome of a successful pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackReport {
    pub archive: PathBuf,
    pub entries: usize,
    pub bytes_read: u64,
}

/// A file found under the source root and the entry name it will get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub entry_name: String,
}

pub struct Packer<'a> {
    options: PackOptions,
    observer: Option<Box<dyn FnMut(PackEvent<'_>) + 'a>>,
}

impl<'a> Packer<'a> {
    pub fn new(options: PackOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    /// Receive [`PackEvent`]s while packing.
    pub fn on_event(mut self, observer: impl FnMut(PackEvent<'_>) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    fn emit(&mut self, event: PackEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(event);
        }
    }

    /// Pack every regular file under `source_dir` into a new archive at
    /// `destination`, replacing whatever was there.
    ///
    /// The source is validated before the destination is touched. On error
    /// a partially written destination may be left behind and must not be
    /// trusted. A destination inside the source tree is never packed into
    /// itself.
    ///
    /// # Arguments
    ///
    /// * `source_dir` - Directory whose regular files become entries
    /// * `destination` - Archive path; its parent directory must exist
    ///
    /// # Returns
    ///
    /// A [`PackReport`] with the entry count and bytes read from the source.
    ///
    /// # Errors
    ///
    /// * [`Error::SourceNotFound`] / [`Error::SourceNotDirectory`] /
    ///   [`Error::SourceAccess`] if the source cannot be used
    /// * [`Error::InvalidFileName`] if a file name is not UTF-8
    /// * [`Error::ContainerOpen`] if the destination cannot be created
    /// * [`Error::ContainerWrite`] if a file cannot be read or added
    /// * [`Error::ContainerClose`] if the archive cannot be finalized
    pub async fn pack(&mut self, source_dir: &Path, destination: &Path) -> Result<PackReport> {
        let root = canonical_source_root(source_dir).await?;
        let mut files = collect_source_files(&root)?;
        if let Some(own_output) = resolve_destination(destination).await {
            files.retain(|file| {
                let keep = file.path != own_output;
                if !keep {
                    warn!(path = %file.path.display(), "skipping the archive being written");
                }
                keep
            });
        }
        let mut progress = ProgressState::new(files.len());
        self.emit(PackEvent::Started { total: files.len() });

        let mut writer = ZipWriter::create(destination)
            .await
            .map_err(|source| Error::ContainerOpen {
                path: destination.to_path_buf(),
                mode: OpenMode::Write,
                source,
            })?
            .with_level(self.options.compression_level);

        let mut bytes_read = 0u64;
        for file in &files {
            let (data, modified) = read_source_file(&file.path).await.map_err(|e| Error::ContainerWrite {
                path: file.path.clone(),
                source: e.into(),
            })?;

            writer
                .add_entry(&file.entry_name, &data, CompressionMethod::Deflate, modified)
                .await
                .map_err(|source| Error::ContainerWrite {
                    path: file.path.clone(),
                    source,
                })?;

            bytes_read += data.len() as u64;
            progress.advance();
            debug!(entry = %file.entry_name, size = data.len(), "added");
            self.emit(PackEvent::EntryAdded {
                progress,
                name: &file.entry_name,
            });
        }

        self.emit(PackEvent::Finalizing);
        let entries = writer.finish().await.map_err(|source| Error::ContainerClose {
            path: destination.to_path_buf(),
            source,
        })?;

        info!(
            archive = %destination.display(),
            entries,
            bytes_read,
            "archive written"
        );

        Ok(PackReport {
            archive: destination.to_path_buf(),
            entries,
            bytes_read,
        })
    }
}

impl Default for Packer<'_> {
    fn default() -> Self {
        Self::new(PackOptions::default())
    }
}

/// Pack `source_dir` into `destination` with default options.
pub async fn pack(source_dir: &Path, destination: &Path) -> Result<PackReport> {
    Packer::default().pack(source_dir, destination).await
}

/// Resolve the source root to its canonical absolute form.
async fn canonical_source_root(source_dir: &Path) -> Result<PathBuf> {
    let access_error = |source: io::Error| {
        if source.kind() == io::ErrorKind::NotFound {
            Error::SourceNotFound(source_dir.to_path_buf())
        } else {
            Error::SourceAccess {
                path: source_dir.to_path_buf(),
                source,
            }
        }
    };

    let root = fs::canonicalize(source_dir).await.map_err(access_error)?;
    if !fs::metadata(&root).await.map_err(access_error)?.is_dir() {
        return Err(Error::SourceNotDirectory(source_dir.to_path_buf()));
    }
    Ok(root)
}

/// Where `destination` will live once created, spelled the way the source
/// walk spells paths. `None` when its parent cannot be resolved.
async fn resolve_destination(destination: &Path) -> Option<PathBuf> {
    let file_name = destination.file_name()?;
    let parent = match destination.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent).await.ok()?;
    Some(parent.join(file_name))
}

/// Enumerate the regular files below `root` in a stable, name-sorted
/// pre-order, together with their entry names.
///
/// Directories never become entries of their own. Symlinks are not
/// descended into; a link to a regular file is packed under the link's
/// own name. FIFOs, sockets, device nodes and links to them are skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidFileName`] for a path below `root` that is not
/// valid UTF-8, and [`Error::Traversal`] if a directory cannot be read.
pub fn collect_source_files(root: &Path) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(Error::Traversal)?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }
        let regular = file_type.is_file() || (file_type.is_symlink() && entry.path().is_file());
        if !regular {
            warn!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }
        if entry.path().strip_prefix(root).is_ok_and(|rel| rel.to_str().is_none()) {
            return Err(Error::InvalidFileName(entry.into_path()));
        }

        let Some(name) = entry_name(root, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping path outside the source root");
            continue;
        };
        files.push(SourceFile {
            path: entry.into_path(),
            entry_name: name,
        });
    }

    Ok(files)
}

/// Strip `root` and the following separator from `path` and join the rest
/// with forward slashes.
///
/// Returns `None` when `path` is not strictly below `root` or the
/// relative part is not valid UTF-8.
pub fn entry_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

async fn read_source_file(path: &Path) -> io::Result<(Vec<u8>, DosDateTime)> {
    let data = fs::read(path).await?;
    let modified = fs::metadata(path)
        .await?
        .modified()
        .map(DosDateTime::from_system_time)
        .unwrap_or(DosDateTime::EPOCH);
    Ok((data, modified))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn entry_names_are_relative_and_slash_separated() {
        let root = Path::new("/data/course");
        assert_eq!(
            entry_name(root, &root.join("content").join("images").join("a.png")).as_deref(),
            Some("content/images/a.png")
        );
        assert_eq!(entry_name(root, &root.join("h5p.json")).as_deref(), Some("h5p.json"));
        assert_eq!(entry_name(root, root), None);
        assert_eq!(entry_name(root, Path::new("/data/other/x.txt")), None);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_have_no_entry_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/data/course");
        let path = root.join(OsStr::from_bytes(b"a\xff.txt"));
        assert_eq!(entry_name(root, &path), None);
    }

    #[test]
    fn collects_files_only_in_sorted_order() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().canonicalize()?;
        fs::create_dir_all(root.join("content/images"))?;
        fs::create_dir_all(root.join("empty"))?;
        fs::write(root.join("h5p.json"), b"{}")?;
        fs::write(root.join("content/content.json"), b"{}")?;
        fs::write(root.join("content/images/b.png"), b"b")?;
        fs::write(root.join("content/images/a.png"), b"a")?;

        let names: Vec<_> = collect_source_files(&root)?
            .into_iter()
            .map(|f| f.entry_name)
            .collect();
        assert_eq!(
            names,
            [
                "content/content.json",
                "content/images/a.png",
                "content/images/b.png",
                "h5p.json"
            ]
        );
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_file_uses_link_name() -> anyhow::Result<()> {
        let outside = tempfile::tempdir()?;
        fs::write(outside.path().join("target.txt"), b"t")?;
        fs::create_dir(outside.path().join("subdir"))?;

        let dir = tempfile::tempdir()?;
        let root = dir.path().canonicalize()?;
        std::os::unix::fs::symlink(outside.path().join("target.txt"), root.join("link.txt"))?;
        std::os::unix::fs::symlink(outside.path().join("subdir"), root.join("linkdir"))?;

        let files = collect_source_files(&root)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].entry_name, "link.txt");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn special_files_are_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path().canonicalize()?;
        fs::write(root.join("a.txt"), b"a")?;
        let status = std::process::Command::new("mkfifo").arg(root.join("pipe")).status()?;
        assert!(status.success());
        let _socket = std::os::unix::net::UnixListener::bind(root.join("socket"))?;
        std::os::unix::fs::symlink(root.join("pipe"), root.join("pipe-link"))?;

        let names: Vec<_> = collect_source_files(&root)?
            .into_iter()
            .map(|f| f.entry_name)
            .collect();
        assert_eq!(names, ["a.txt"]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn pack_with_fifo_in_source_completes() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"a")?;
        let status = std::process::Command::new("mkfifo")
            .arg(src.path().join("pipe"))
            .status()?;
        assert!(status.success());
        let out = tempfile::tempdir()?;

        let report = pack(src.path(), &out.path().join("out.h5p")).await?;
        assert_eq!(report.entries, 1);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_file_name_is_rejected_by_name() -> anyhow::Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let src = tempfile::tempdir()?;
        let bad = src.path().join(OsStr::from_bytes(b"a\xff.txt"));
        fs::write(&bad, b"x")?;
        fs::write(src.path().join(OsStr::from_bytes(b"a\xfe.txt")), b"y")?;
        let out = tempfile::tempdir()?;
        let dest = out.path().join("out.h5p");

        let err = pack(src.path(), &dest).await.unwrap_err();
        assert!(matches!(&err, Error::InvalidFileName(path) if path.ends_with(bad.file_name().unwrap())));
        assert_eq!(err.kind(), crate::error::ErrorKind::Filesystem);
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn destination_inside_source_is_not_packed() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"a")?;
        let dest = src.path().join("out.h5p");

        pack(src.path(), &dest).await?;
        // The second run finds the first archive in the walk
        let report = pack(src.path(), &dest).await?;
        assert_eq!(report.entries, 1);

        let extractor = crate::zip::ZipExtractor::new(std::sync::Arc::new(
            crate::io::LocalFileReader::new(&dest)?,
        ));
        let names: Vec<_> = extractor
            .list_files()
            .await?
            .into_iter()
            .map(|e| e.file_name)
            .collect();
        assert_eq!(names, ["a.txt"]);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inaccessible_source_is_not_reported_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let looped = dir.path().join("loop");
        std::os::unix::fs::symlink(dir.path().join("other"), &looped)?;
        std::os::unix::fs::symlink(&looped, dir.path().join("other"))?;
        let dest = dir.path().join("out.h5p");

        let err = pack(&looped, &dest).await.unwrap_err();
        assert!(matches!(err, Error::SourceAccess { .. }));
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn progress_events_cover_every_file() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"a")?;
        fs::write(src.path().join("b.txt"), b"b")?;
        let out = tempfile::tempdir()?;

        let mut percents = Vec::new();
        let mut finalized = false;
        let mut started_with = None;
        let report = Packer::default()
            .on_event(|event| match event {
                PackEvent::Started { total } => started_with = Some(total),
                PackEvent::EntryAdded { progress, .. } => percents.push(progress.percent()),
                PackEvent::Finalizing => finalized = true,
            })
            .pack(src.path(), &out.path().join("out.h5p"))
            .await?;

        assert_eq!(report.entries, 2);
        assert_eq!(report.bytes_read, 2);
        assert_eq!(started_with, Some(2));
        assert_eq!(percents, [50, 100]);
        assert!(finalized);
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_is_reported_before_writing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dest = dir.path().join("out.h5p");

        let err = pack(&dir.path().join("missing"), &dest).await.unwrap_err();
        assert!(matches!(err, Error::SourceNotFound(_)));
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn file_as_source_is_rejected() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("plain.txt");
        fs::write(&file, b"x")?;
        let dest = dir.path().join("out.h5p");

        let err = pack(&file, &dest).await.unwrap_err();
        assert!(matches!(err, Error::SourceNotDirectory(_)));
        assert!(!dest.exists());
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_destination_is_an_open_error() -> anyhow::Result<()> {
        let src = tempfile::tempdir()?;
        fs::write(src.path().join("a.txt"), b"a")?;

        let err = pack(src.path(), &src.path().join("no/such/dir/out.h5p"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContainerOpen { mode: OpenMode::Write, .. }));
        Ok(())
    }
}
