//! Entry point for the `osm-sync` command-line interface.
#![forbid(unsafe_code)]

use osm_sync_cli::CliError;

fn main() {
    env_logger::init();
    match osm_sync_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => {
            eprintln!("osm-sync: {err}");
            std::process::exit(1);
        }
    }
}
