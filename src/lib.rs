//! # h5packer
//!
//! Packs a content directory into an H5P package and unpacks it again.
//!
//! An H5P package is an ordinary ZIP archive with a different extension.
//! Packing stores every regular file below the source directory under its
//! `/`-separated relative path, always with the DEFLATE method, so the
//! result opens in any ZIP tool. Unpacking empties the destination
//! directory first so a previous extraction never leaks into the new one.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let packed = h5packer::pack(Path::new("course"), Path::new("course.h5p")).await?;
//!     println!("{} entries written", packed.entries);
//!
//!     let unpacked = h5packer::unpack(Path::new("course.h5p"), Path::new("course-copy")).await?;
//!     assert_eq!(packed.entries, unpacked.entries);
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod cli;
pub mod error;
pub mod io;
pub mod packer;
pub mod progress;
pub mod unpacker;
pub mod zip;

pub use cleanup::clear_directory;
pub use cli::Cli;
pub use error::{Error, ErrorKind, OpenMode, Result};
pub use io::{LocalFileReader, ReadAt};
pub use packer::{PackOptions, PackReport, Packer, pack};
pub use progress::{PackEvent, ProgressState};
pub use unpacker::{UnpackEvent, UnpackReport, Unpacker, unpack};
pub use crate::zip::{CompressionMethod, ZipExtractor, ZipFileEntry, ZipWriter};
