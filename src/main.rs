//! Main entry point for the h5packer CLI application.
//!
//! `pack` turns a directory into an H5P package, `unpack` extracts a
//! package into a directory. Every failure, including bad arguments,
//! ends with exit code 1.

use anyhow::Result;
use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use h5packer::cli::{Command, UsageHint};
use h5packer::{Cli, PackEvent, PackOptions, Packer, UnpackEvent, Unpacker};

/// Environment variable overriding the log filter, e.g. `H5PACKER_LOG=debug`.
const LOG_ENV: &str = "H5PACKER_LOG";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();

    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => return usage_error(err, &args),
    };

    init_logging(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Print usage for a failed parse. Only `--version` counts as success.
fn usage_error(err: clap::Error, args: &[OsString]) -> ExitCode {
    match err.kind() {
        ClapErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        ClapErrorKind::ValueValidation | ClapErrorKind::InvalidValue => {
            let _ = err.print();
            ExitCode::FAILURE
        }
        _ => {
            println!("{}", UsageHint::from_args(args).text());
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr. `H5PACKER_LOG`, then `RUST_LOG`, win over `-v`/`-q`.
fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let quiet = cli.is_quiet();

    match cli.command {
        Command::Pack {
            source_dir,
            destination_file,
            level,
        } => {
            let bar = progress_bar(quiet)?;

            let result = Packer::new(PackOptions {
                compression_level: level,
            })
            .on_event(|event| match event {
                PackEvent::Started { total } => bar.set_message(format!("0/{total} files")),
                PackEvent::EntryAdded { progress, .. } => {
                    bar.set_position(progress.percent() as u64);
                    bar.set_message(format!("{}/{} files", progress.processed, progress.total));
                }
                PackEvent::Finalizing => {
                    bar.set_position(100);
                    bar.finish();
                    if !quiet {
                        println!("Writing to disk ...");
                    }
                }
            })
            .pack(&source_dir, &destination_file)
            .await;

            if result.is_err() {
                bar.abandon();
            }
            result?;

            println!(
                "H5P archive created successfully: {}",
                destination_file.display()
            );
        }
        Command::Unpack {
            archive_file,
            destination_dir,
        } => {
            Unpacker::new()
                .on_event(|event| {
                    if let UnpackEvent::Cleaned { destination, .. } = event {
                        println!("Cleaned up destination directory: {}", destination.display());
                    }
                })
                .unpack(&archive_file, &destination_dir)
                .await?;

            println!(
                "Archive extracted successfully to: {}",
                destination_dir.display()
            );
        }
    }

    Ok(())
}

/// 0-100% bar in the style of `Progress: [=====     ] 50%`.
fn progress_bar(hidden: bool) -> Result<ProgressBar> {
    if hidden {
        return Ok(ProgressBar::hidden());
    }

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("Progress: [{bar:50}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    Ok(bar)
}
