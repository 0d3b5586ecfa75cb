//! Quantlink - post-quantum secure chat and file transfer
//!
//! CLI for connecting to a listening peer over TCP with a
//! passphrase-seeded, Kyber-rekeyed session.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CommandExecutor, ConnectCommand};

/// Quantlink - post-quantum secure chat and file transfer
#[derive(Parser)]
#[command(name = "quantlink")]
#[command(version)]
#[command(about = "Encrypted chat and file transfer with Kyber-512 forward secrecy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a listening peer and start an interactive session
    Connect(ConnectCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Connect(cmd) => cmd.execute(),
    }
}
