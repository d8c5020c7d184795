use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Wrap and unwrap small secrets with a device-bound master key.
#[derive(Parser, Debug)]
#[command(name = "securestore", version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the software master key.
    ///
    /// Defaults to `securestore` under the platform data directory.
    #[arg(long, env = "SECURESTORE_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// JSON configuration file; environment variables override its fields.
    #[arg(long, env = "SECURESTORE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log library activity at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report whether the store is supported and whether a master key exists.
    Probe,

    /// Encrypt a secret into an envelope.
    Encrypt {
        /// Secret given inline instead of read from a file.
        #[arg(long, conflicts_with = "input")]
        text: Option<String>,

        #[command(flatten)]
        io: IoArgs,

        /// Context bound to the envelope, hex-encoded.
        #[arg(long)]
        context: Option<String>,

        /// Write the envelope as base64 text.
        #[arg(long)]
        base64: bool,
    },

    /// Decrypt an envelope back into the secret.
    Decrypt {
        #[command(flatten)]
        io: IoArgs,

        /// Context the envelope was bound to, hex-encoded.
        #[arg(long)]
        context: Option<String>,

        /// Read the envelope as base64 text.
        #[arg(long)]
        base64: bool,
    },

    /// Parse an envelope header without decrypting it.
    Inspect {
        /// File holding the envelope; stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Read the envelope as base64 text.
        #[arg(long)]
        base64: bool,
    },
}

#[derive(Args, Debug)]
pub struct IoArgs {
    /// Input file; stdin when omitted.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
