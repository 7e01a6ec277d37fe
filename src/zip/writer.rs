//! Sequential ZIP archive writer.
//!
//! Entries are compressed in memory and appended one after another as
//! a Local File Header plus payload. The Central Directory and the EOCD
//! record are written by [`ZipWriter::finish`]; until then the file on
//! disk is not a readable archive.
//!
//! Only the classic layout is produced. Anything that would need ZIP64
//! (more than 65534 entries, sizes or offsets of 4 GiB and above) is
//! refused instead of being written incorrectly.

use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::error::{Result, ZipError};
use super::structures::*;

/// Default deflate level, same as zlib's
pub const DEFAULT_LEVEL: u32 = 6;

pub struct ZipWriter {
    out: BufWriter<File>,
    /// Bytes written so far, i.e. the offset of the next Local File Header
    offset: u64,
    entries: Vec<(EntryHeader, u32)>,
    names: HashSet<String>,
    level: Compression,
}

impl ZipWriter {
    /// Create (or truncate) the archive at `path`.
    ///
    /// # Arguments
    ///
    /// * `path` - Where the archive is written; its parent must exist
    ///
    /// # Errors
    ///
    /// Returns [`ZipError::Io`] if the file cannot be created.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self {
            out: BufWriter::new(file),
            offset: 0,
            entries: Vec::new(),
            names: HashSet::new(),
            level: Compression::new(DEFAULT_LEVEL),
        })
    }

    /// Set the deflate level (0-9) for subsequent entries.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = Compression::new(level.min(9));
        self
    }

    /// Append one entry holding `data` under `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Relative, `/`-separated entry name, unique in the archive
    /// * `data` - Uncompressed file contents
    /// * `method` - [`CompressionMethod::Stored`] or [`CompressionMethod::Deflate`]
    /// * `modified` - Timestamp recorded in both headers
    ///
    /// # Errors
    ///
    /// Returns [`ZipError::Format`] for an invalid or duplicate name,
    /// [`ZipError::Unsupported`] when ZIP64 would be needed or the method
    /// is unknown, and [`ZipError::Io`] if writing fails.
    pub async fn add_entry(
        &mut self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
        modified: DosDateTime,
    ) -> Result<()> {
        validate_entry_name(name)?;
        if self.names.contains(name) {
            return Err(ZipError::Format(format!("Duplicate entry name: {name}")));
        }
        if self.entries.len() >= (u16::MAX - 1) as usize {
            return Err(ZipError::Unsupported(
                "more than 65534 entries requires ZIP64".to_string(),
            ));
        }

        let uncompressed_size = to_u32(data.len() as u64, name)?;
        let lfh_offset = to_u32(self.offset, name)?;

        let payload = match method {
            CompressionMethod::Stored => data.to_vec(),
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
                encoder.write_all(data)?;
                encoder.finish()?
            }
            CompressionMethod::Unknown(v) => {
                return Err(ZipError::Unsupported(format!("compression method {v}")));
            }
        };

        let mut crc = flate2::Crc::new();
        crc.update(data);

        let header = EntryHeader {
            file_name: name.to_string(),
            flags: if name.is_ascii() { 0 } else { FLAG_UTF8 },
            compression_method: method,
            modified,
            crc32: crc.sum(),
            compressed_size: to_u32(payload.len() as u64, name)?,
            uncompressed_size,
        };

        let lfh = header.local_header_bytes();
        self.out.write_all(&lfh).await?;
        self.out.write_all(&payload).await?;
        self.offset += (lfh.len() + payload.len()) as u64;

        self.names.insert(header.file_name.clone());
        self.entries.push((header, lfh_offset));
        Ok(())
    }

    /// Write the Central Directory and EOCD, then flush everything to disk.
    ///
    /// # Returns
    ///
    /// The number of entries in the finished archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the Central Directory would need ZIP64 or the
    /// final write, flush or sync fails.
    pub async fn finish(mut self) -> Result<usize> {
        let cd_offset = to_u32(self.offset, "central directory")?;

        let mut cd_size = 0u64;
        for (header, lfh_offset) in &self.entries {
            let bytes = header.central_header_bytes(*lfh_offset);
            self.out.write_all(&bytes).await?;
            cd_size += bytes.len() as u64;
        }
        let cd_size = to_u32(cd_size, "central directory")?;

        let eocd = EndOfCentralDirectory::new(self.entries.len() as u16, cd_size, cd_offset);
        self.out.write_all(&eocd.to_bytes()).await?;

        self.out.flush().await?;
        self.out.get_ref().sync_all().await?;
        Ok(self.entries.len())
    }
}

/// Entry names must be relative, forward-slash separated paths.
fn validate_entry_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('/')
        && !name.contains('\\')
        && name.len() <= u16::MAX as usize
        && name.split('/').all(|part| !part.is_empty() && part != "." && part != "..");
    if !valid {
        return Err(ZipError::Format(format!("Invalid entry name: {name:?}")));
    }
    Ok(())
}

fn to_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ZipError::Unsupported(format!("{what} exceeds 4 GiB, which requires ZIP64")))
}
