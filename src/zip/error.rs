use std::io;

use thiserror::Error;

/// Errors raised by the container layer itself.
#[derive(Error, Debug)]
pub enum ZipError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Format(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Refusing to extract unsafe entry name: {0}")]
    UnsafePath(String),

    #[error("CRC-32 mismatch for {name}: expected {expected:08x}, got {actual:08x}")]
    Checksum {
        name: String,
        expected: u32,
        actual: u32,
    },
}

pub type Result<T> = std::result::Result<T, ZipError>;

macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::zip::ZipError::Format(format!($($arg)*)))
    };
}

pub(crate) use bail;
