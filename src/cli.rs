use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::zip::DEFAULT_LEVEL;

pub const USAGE: &str = "\
Usage: h5packer [pack|unpack] args...
  For unpacking: h5packer unpack <archiveFile> <destinationDir>
  For repacking: h5packer pack <sourceDir> <destinationFile>";

pub const PACK_USAGE: &str = "Usage: h5packer pack <sourceDir> <destinationFile>";
pub const UNPACK_USAGE: &str = "Usage: h5packer unpack <archiveFile> <destinationDir>";

#[derive(Parser, Debug)]
#[command(name = "h5packer")]
#[command(version)]
#[command(about = "Create and extract H5P packages", long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-vv for debug)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode, no progress bar (-qq => no log output at all)
    #[arg(short = 'q', long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Create an H5P archive from a directory
    #[command(visible_alias = "repack")]
    Pack {
        #[arg(value_name = "SOURCE_DIR")]
        source_dir: PathBuf,

        #[arg(value_name = "DESTINATION_FILE")]
        destination_file: PathBuf,

        /// Deflate compression level
        #[arg(short = 'l', long, default_value_t = DEFAULT_LEVEL, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// Extract an H5P archive into a directory, replacing its contents
    Unpack {
        #[arg(value_name = "ARCHIVE_FILE")]
        archive_file: PathBuf,

        #[arg(value_name = "DESTINATION_DIR")]
        destination_dir: PathBuf,
    },
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default tracing filter when no environment override is set.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "off",
            (1, _) => "error",
            (_, 0) => "warn",
            (_, 1) => "info",
            _ => "debug",
        }
    }
}

/// What to print when the arguments do not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageHint {
    /// `pack`/`repack` was given the wrong arguments
    Pack,
    /// `unpack` was given the wrong arguments
    Unpack,
    /// No command, or an explicit request for help
    General,
    /// Something that is not a command at all
    InvalidCommand,
}

impl UsageHint {
    /// Classify a failed invocation by its first positional argument.
    pub fn from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let command = args
            .into_iter()
            .skip(1)
            .map(Into::<OsString>::into)
            .find(|arg| !arg.to_string_lossy().starts_with('-'));

        match command.as_ref().and_then(|c| c.to_str()) {
            None | Some("help") => UsageHint::General,
            Some("pack" | "repack") => UsageHint::Pack,
            Some("unpack") => UsageHint::Unpack,
            Some(_) => UsageHint::InvalidCommand,
        }
    }

    pub fn text(&self) -> String {
        match self {
            UsageHint::Pack => PACK_USAGE.to_string(),
            UsageHint::Unpack => UNPACK_USAGE.to_string(),
            UsageHint::General => USAGE.to_string(),
            UsageHint::InvalidCommand => format!("Invalid command.\n{USAGE}"),
        }
    }
}
