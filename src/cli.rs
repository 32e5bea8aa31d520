//! Helpers shared by the `pi-*` binaries.

use clap::Parser;
use clap::error::ErrorKind;
use colored::Colorize;
use std::process::ExitCode;

/// Parse arguments, mapping every usage error to exit status 1.
///
/// `--help` and `--version` still exit 0.
pub fn parse_args<T: Parser>() -> Result<T, ExitCode> {
    T::try_parse().map_err(|e| {
        let _ = e.print();
        match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        }
    })
}

/// Report an error that happened before a run log exists.
pub fn fatal(message: impl std::fmt::Display) -> ExitCode {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
    ExitCode::FAILURE
}
