use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::io::ReadAt;

use super::error::{Result, ZipError, bail};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract file data to memory, verifying its CRC-32
    pub async fn extract_to_memory(&self, entry: &ZipFileEntry) -> Result<Vec<u8>> {
        if entry.is_encrypted() {
            return Err(ZipError::Unsupported(format!(
                "encrypted entry {}",
                entry.file_name
            )));
        }

        let data_offset = self.parser.get_data_offset(entry).await?;

        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.parser.reader().read_exact_at(data_offset, &mut raw).await?;

        let data = match entry.compression_method {
            CompressionMethod::Stored => raw,
            CompressionMethod::Deflate => {
                // Never inflate past the declared size; the check below catches overruns
                let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 26) as usize);
                DeflateDecoder::new(raw.as_slice())
                    .take(entry.uncompressed_size + 1)
                    .read_to_end(&mut out)?;
                out
            }
            CompressionMethod::Unknown(v) => {
                return Err(ZipError::Unsupported(format!(
                    "compression method {} for {}",
                    v, entry.file_name
                )));
            }
        };

        if data.len() as u64 != entry.uncompressed_size {
            bail!(
                "Size mismatch for {}: expected {} bytes, got {}",
                entry.file_name,
                entry.uncompressed_size,
                data.len()
            );
        }

        let mut crc = flate2::Crc::new();
        crc.update(&data);
        if crc.sum() != entry.crc32 {
            return Err(ZipError::Checksum {
                name: entry.file_name.clone(),
                expected: entry.crc32,
                actual: crc.sum(),
            });
        }

        Ok(data)
    }

    /// Extract file to disk
    pub async fn extract_to_file(&self, entry: &ZipFileEntry, output_path: &Path) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }

    /// Extract every entry below `dest`, recreating directory structure.
    ///
    /// All entry names are checked before anything is written; a name that
    /// would resolve outside `dest` aborts the extraction up front. Other
    /// failures leave the entries written so far in place.
    ///
    /// Returns the number of file entries written.
    pub async fn extract_all(&self, dest: &Path) -> Result<usize> {
        let entries = self.list_files().await?;
        self.extract_entries(&entries, dest).await
    }

    /// Same as [`extract_all`](Self::extract_all) for an already listed archive.
    pub async fn extract_entries(&self, entries: &[ZipFileEntry], dest: &Path) -> Result<usize> {
        let targets = entries
            .iter()
            .map(|entry| Ok((entry, dest.join(sanitize_entry_name(&entry.file_name)?))))
            .collect::<Result<Vec<_>>>()?;

        let mut written = 0;
        for (entry, output_path) in targets {
            if entry.is_directory {
                fs::create_dir_all(&output_path).await?;
                continue;
            }

            debug!(entry = %entry.file_name, method = %entry.compression_method, "extracting");
            self.extract_to_file(entry, &output_path).await?;
            written += 1;
        }

        Ok(written)
    }
}

/// Map an entry name to a relative path, rejecting anything that could
/// escape the extraction root.
pub fn sanitize_entry_name(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    if normalized.starts_with('/') {
        return Err(ZipError::UnsafePath(name.to_string()));
    }

    let mut path = PathBuf::new();
    for part in normalized.split('/') {
        match Path::new(part).components().next() {
            None => {}
            Some(Component::CurDir) => {}
            Some(Component::Normal(p)) if Path::new(part).components().count() == 1 => {
                path.push(p)
            }
            _ => return Err(ZipError::UnsafePath(name.to_string())),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(ZipError::UnsafePath(name.to_string()));
    }
    Ok(path)
}
