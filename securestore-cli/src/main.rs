//! `securestore` developer CLI.
//!
//! Drives the software key container from the command line: probe support,
//! wrap a secret into an envelope, unwrap it, and inspect envelope headers.
//! Set `RUST_LOG` (or pass `--verbose`) to see the library's log output.

mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "securestore=debug,securestore_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut stdout = std::io::stdout().lock();
    commands::execute(&cli, &mut stdout)
}
