//! Application wiring
//!
//! Loads the node identity, builds the TCP transport and the chat, prints chat
//! events to stdout, broadcasts stdin lines and shuts down on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::time::Duration;

use peerchat_core::{ChatError, IdentityKeyPair};
use peerchat_runtime::{Chat, ChatHandle};
use peerchat_tcp::{TcpTransport, TcpTransportConfig};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::Result;

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

pub struct PeerChatApp {
    config: AppConfig,
    identity: IdentityKeyPair,
}

impl PeerChatApp {
    /// Load (or create) the private key and prepare the node
    pub fn new(config: AppConfig, key_override: Option<PathBuf>) -> Result<Self> {
        let key_file = key_override.unwrap_or_else(|| config.key_file.clone());
        let identity = IdentityKeyPair::load_or_generate(&key_file)?;

        Ok(Self { config, identity })
    }

    pub fn identity(&self) -> &IdentityKeyPair {
        &self.identity
    }

    /// Run the node until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let AppConfig {
            name,
            peers,
            listen,
            redial_interval_secs,
            channels,
            ..
        } = self.config;

        info!(id = %self.identity.peer_id(), name = %name, "Starting PeerChat node");

        let transport = TcpTransport::new(
            TcpTransportConfig::new(self.identity, name)
                .listen_addr(&listen)
                .max_peers(peers.len())
                .redial_interval(Duration::from_secs(redial_interval_secs)),
        );
        let (mut chat, handle) = Chat::new(transport, peers, channels)?;

        chat.on_msg(|peer, text| println!("{}: {}", peer.name, text))
            .on_peer_in(|peer| println!("connected to {}", peer.name))
            .on_peer_out(|peer| println!("disconnected from {}", peer.name));

        let cancel = CancellationToken::new();
        let signals = tokio::spawn(shutdown_on_signal(cancel.clone()));
        let input = tokio::spawn(input_loop(handle, spawn_stdin_reader(), cancel.clone()));

        let result = chat.run(cancel.clone()).await;

        // The chat may have failed to start; release the input task either way
        cancel.cancel();
        if let Err(e) = input.await {
            warn!(error = %e, "Input task failed");
        }
        signals.abort();

        result?;
        info!("PeerChat node stopped");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Input
// ----------------------------------------------------------------------------

/// Read stdin on a dedicated thread so a pending read never holds up shutdown
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);

    std::thread::spawn(move || {
        use std::io::BufRead;

        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

/// Broadcast each non-empty line; on end of input close the chat handle
async fn input_loop(
    handle: ChatHandle,
    mut lines: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };

        let Some(line) = line else {
            info!("Input closed, no longer sending");
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        match handle.send(&cancel, text).await {
            Ok(()) => {}
            Err(ChatError::Cancelled) => break,
            Err(e) => {
                warn!(error = %e, "Failed to send message");
                break;
            }
        }
    }

    handle.close();
}

// ----------------------------------------------------------------------------
// Signals
// ----------------------------------------------------------------------------

async fn shutdown_on_signal(cancel: CancellationToken) {
    match wait_for_signal().await {
        Ok(()) => {
            info!("Shutdown signal received");
            cancel.cancel();
        }
        Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => {
            debug!("SIGTERM");
            Ok(())
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
