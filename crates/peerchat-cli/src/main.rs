//! PeerChat CLI entry point

use clap::Parser;
use tracing::{error, info};

use peerchat_cli::{app::PeerChatApp, cli::Cli, config::AppConfig, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    if cli.example_config {
        print!("{}", AppConfig::example()?);
        return Ok(());
    }

    // Load configuration
    info!("Loading configuration from: {}", cli.config.display());
    let config = match AppConfig::load_from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let app = match PeerChatApp::new(config, cli.key) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to load identity: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("PeerChat exited with error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
