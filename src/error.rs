use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::zip::ZipError;

/// Coarse classification of an [`Error`], for callers that need to branch on
/// what went wrong rather than print it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceNotFound,
    ContainerOpen,
    ContainerClose,
    Extraction,
    Filesystem,
}

/// Which side of the container an open failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Write,
    Read,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Write => f.write_str("writing"),
            OpenMode::Read => f.write_str("extraction"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Source directory does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Cannot access source directory: {}", .path.display())]
    SourceAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),

    #[error("Archive file does not exist: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Cannot open <{}> for {mode}", .path.display())]
    ContainerOpen {
        path: PathBuf,
        mode: OpenMode,
        #[source]
        source: ZipError,
    },

    #[error("Cannot add {} to the archive", .path.display())]
    ContainerWrite {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Could not close the zip archive: {}", .path.display())]
    ContainerClose {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("Extraction failed")]
    Extraction(#[source] ZipError),

    #[error("File name is not valid UTF-8: {}", .0.display())]
    InvalidFileName(PathBuf),

    #[error("Cannot traverse source directory")]
    Traversal(#[source] walkdir::Error),

    #[error("Cannot create destination directory: {}", .path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot clean up {}", .path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceNotFound(_) | Error::SourceNotDirectory(_) | Error::ArchiveNotFound(_) => {
                ErrorKind::SourceNotFound
            }
            Error::ContainerOpen { .. } | Error::ContainerWrite { .. } => ErrorKind::ContainerOpen,
            Error::ContainerClose { .. } => ErrorKind::ContainerClose,
            Error::Extraction(_) => ErrorKind::Extraction,
            Error::SourceAccess { .. }
            | Error::InvalidFileName(_)
            | Error::Traversal(_)
            | Error::CreateDestination { .. }
            | Error::Cleanup { .. } => ErrorKind::Filesystem,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
