//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Broadcast chat with a fixed set of peers", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = "peerchat.toml")]
    pub config: PathBuf,

    /// Private key file, overriding the configured one
    #[arg(short, long)]
    pub key: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    pub example_config: bool,
}
