//! Command-line interface for OSM viewport synchronisation.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};

mod error;
mod sync;

pub use error::CliError;

const ARG_LON: &str = "lon";
const ARG_LAT: &str = "lat";
const ARG_SERVER: &str = "server";
const ARG_STAGING_DIR: &str = "staging-dir";
const ARG_EDITS_DIR: &str = "edits-dir";
const ARG_CONVERTER: &str = "converter";
const ARG_INITIAL_HALF_EXTENT: &str = "initial-half-extent";
const ARG_SHRINK_FACTOR: &str = "shrink-factor";
const ARG_MIN_HALF_EXTENT: &str = "min-half-extent";
const ENV_LON: &str = "OSM_SYNC_CMDS_SYNC_LON";
const ENV_LAT: &str = "OSM_SYNC_CMDS_SYNC_LAT";

/// Run the CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns a [`CliError`] when arguments or configuration are invalid, a
/// collaborator cannot be built, or the synchronisation session fails.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Sync(args) => sync::run_sync(args),
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "osm-sync",
    about = "Keep a local OpenStreetMap working set in step with a viewport",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download, convert and index the area around a map centre.
    Sync(sync::SyncArgs),
}

#[cfg(test)]
mod tests;
