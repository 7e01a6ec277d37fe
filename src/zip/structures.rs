use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;
use std::time::SystemTime;

use time::OffsetDateTime;

use super::error::{Result, ZipError, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => f.write_str("stored"),
            CompressionMethod::Deflate => f.write_str("deflate"),
            CompressionMethod::Unknown(v) => write!(f, "method {v}"),
        }
    }
}

/// General purpose bit 0: entry is encrypted
pub const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose bit 11: file name is UTF-8
pub const FLAG_UTF8: u16 = 0x0800;

/// "Version needed to extract" for deflate entries (2.0)
pub const VERSION_NEEDED: u16 = 20;
/// "Version made by": upper byte 3 = Unix, lower byte = APPNOTE version 2.0
pub const VERSION_MADE_BY: u16 = (3 << 8) | 20;

/// Unix regular file, mode 0644, stored in the high half of external attributes
pub const UNIX_FILE_ATTRS: u32 = 0o100644 << 16;

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Single-disk record without a comment.
    ///
    /// # Arguments
    ///
    /// * `total_entries` - Number of Central Directory records
    /// * `cd_size` - Size of the Central Directory in bytes
    /// * `cd_offset` - Offset of the first Central Directory record
    pub fn new(total_entries: u16, cd_size: u32, cd_offset: u32) -> Self {
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
            comment_len: 0,
        }
    }

    /// Parse an EOCD record.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is shorter than [`Self::SIZE`] or does
    /// not start with the EOCD signature.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            bail!("Invalid End of Central Directory");
        }

        // Verify signature
        if &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        let mut cursor = Cursor::new(&data[4..]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// Serialize to exactly [`Self::SIZE`] bytes (no comment).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        // Writes into a Vec cannot fail
        let _ = buf.write_u16::<LittleEndian>(self.disk_number);
        let _ = buf.write_u16::<LittleEndian>(self.disk_with_cd);
        let _ = buf.write_u16::<LittleEndian>(self.disk_entries);
        let _ = buf.write_u16::<LittleEndian>(self.total_entries);
        let _ = buf.write_u32::<LittleEndian>(self.cd_size);
        let _ = buf.write_u32::<LittleEndian>(self.cd_offset);
        let _ = buf.write_u16::<LittleEndian>(self.comment_len);
        buf
    }

    /// Whether any field is saturated, meaning the real value lives in
    /// the ZIP64 EOCD.
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Parse a locator record.
    ///
    /// # Arguments
    ///
    /// * `data` - At least [`Self::SIZE`] bytes starting at the signature
    ///
    /// # Errors
    ///
    /// Returns [`ZipError::Format`] on a bad signature or short buffer and
    /// [`ZipError::Unsupported`] for split (multi-disk) archives.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[4..]);
        let disk_with_eocd64 = cursor.read_u32::<LittleEndian>()?;
        let eocd64_offset = cursor.read_u64::<LittleEndian>()?;
        let total_disks = cursor.read_u32::<LittleEndian>()?;

        if disk_with_eocd64 != 0 || total_disks > 1 {
            return Err(ZipError::Unsupported(format!(
                "archive split across {total_disks} disks"
            )));
        }

        Ok(Self { eocd64_offset })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        // Skip record size, versions and disk numbers
        let mut cursor = Cursor::new(&data[24..]);
        let _disk_entries = cursor.read_u64::<LittleEndian>()?;

        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// MS-DOS packed timestamp as stored in file headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Convert a filesystem timestamp (interpreted as UTC).
    ///
    /// Instants outside 1980..=2107 clamp to [`DosDateTime::EPOCH`].
    pub fn from_system_time(t: SystemTime) -> Self {
        let dt = OffsetDateTime::from(t);
        let year = dt.year();
        if !(1980..=2107).contains(&year) {
            return Self::EPOCH;
        }

        let date = (((year - 1980) as u16) << 9) | ((u8::from(dt.month()) as u16) << 5) | dt.day() as u16;
        let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
        Self { time, date }
    }
}

/// Fields shared by the local header and the central directory record of
/// one entry being written.
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl EntryHeader {
    /// Serialize as a Local File Header followed by the file name.
    pub fn local_header_bytes(&self) -> Vec<u8> {
        let name = self.file_name.as_bytes();
        let mut buf = Vec::with_capacity(LFH_SIZE + name.len());
        buf.extend_from_slice(LFH_SIGNATURE);
        let _ = buf.write_u16::<LittleEndian>(VERSION_NEEDED);
        self.write_common(&mut buf);
        let _ = buf.write_u16::<LittleEndian>(0); // extra field length
        buf.extend_from_slice(name);
        buf
    }

    /// Serialize as a Central Directory File Header pointing at `lfh_offset`.
    pub fn central_header_bytes(&self, lfh_offset: u32) -> Vec<u8> {
        let name = self.file_name.as_bytes();
        let mut buf = Vec::with_capacity(CDFH_MIN_SIZE + name.len());
        buf.extend_from_slice(CDFH_SIGNATURE);
        let _ = buf.write_u16::<LittleEndian>(VERSION_MADE_BY);
        let _ = buf.write_u16::<LittleEndian>(VERSION_NEEDED);
        self.write_common(&mut buf);
        let _ = buf.write_u16::<LittleEndian>(0); // extra field length
        let _ = buf.write_u16::<LittleEndian>(0); // comment length
        let _ = buf.write_u16::<LittleEndian>(0); // disk number start
        let _ = buf.write_u16::<LittleEndian>(0); // internal attributes
        let _ = buf.write_u32::<LittleEndian>(UNIX_FILE_ATTRS);
        let _ = buf.write_u32::<LittleEndian>(lfh_offset);
        buf.extend_from_slice(name);
        buf
    }

    /// Flags through file name length, identical in both header kinds.
    fn write_common(&self, buf: &mut Vec<u8>) {
        let _ = buf.write_u16::<LittleEndian>(self.flags);
        let _ = buf.write_u16::<LittleEndian>(self.compression_method.as_u16());
        let _ = buf.write_u16::<LittleEndian>(self.modified.time);
        let _ = buf.write_u16::<LittleEndian>(self.modified.date);
        let _ = buf.write_u32::<LittleEndian>(self.crc32);
        let _ = buf.write_u32::<LittleEndian>(self.compressed_size);
        let _ = buf.write_u32::<LittleEndian>(self.uncompressed_size);
        let _ = buf.write_u16::<LittleEndian>(self.file_name.len() as u16);
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
