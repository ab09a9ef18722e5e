//! PeerChat CLI library
//!
//! Configuration loading, command-line arguments and the wiring that runs a chat
//! node over TCP with stdin as input and stdout as output.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;

pub use app::PeerChatApp;
pub use cli::Cli;
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
