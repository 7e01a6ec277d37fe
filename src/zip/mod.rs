//! ZIP container reading and writing.
//!
//! This is the archive capability the packer and unpacker are built on:
//! a sequential [`ZipWriter`] for creating packages and a
//! [`ZipExtractor`] for listing and materializing them.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`extractor`]: Listing and extraction on top of the parser
//! - [`writer`]: Archive creation
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions when reading
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No ZIP64 output, so packages are limited to 65534 entries below 4 GiB

mod error;
mod extractor;
mod parser;
mod structures;
mod writer;

pub use error::{Result, ZipError};
pub use extractor::{ZipExtractor, sanitize_entry_name};
pub use parser::ZipParser;
pub use structures::*;
pub use writer::{DEFAULT_LEVEL, ZipWriter};
