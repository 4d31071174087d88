use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Resumable uploads and keepalive beacons from the command line.
#[derive(Parser, Debug)]
#[command(name = "uplink", author, version, about)]
pub struct Args {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file through the resumable upload protocol
    UploadFile {
        path: PathBuf,

        /// Endpoint that starts upload sessions
        #[arg(long)]
        endpoint: String,

        /// File whose bytes are sent as upload metadata
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Send content right after the metadata even for async scans
        #[arg(long)]
        force_sync: bool,
    },

    /// Upload a saved page capture
    UploadPage {
        capture: PathBuf,

        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Send a keepalive request that outlives its initiator
    Beacon {
        url: String,

        #[arg(long, default_value = "POST")]
        method: String,

        #[arg(long)]
        body: Option<String>,

        /// Attach the configured retry options
        #[arg(long)]
        retry: bool,

        /// Drop the initiator right after starting
        #[arg(long)]
        detach: bool,
    },
}
