mod error;
mod handler;
mod server;
mod subsystem;

pub use error::{Result, SshError};
pub use server::RelayServer;

use std::sync::Arc;

use relay_chat::ChatHub;
use relay_identity::IdentityStore;
use relay_pairing::PairingManager;
use russh::server::{Config as RusshConfig, Server as _};
use russh_keys::key::KeyPair;
use tokio::io::DuplexStream;

/// Bind and serve the SSH front-end on `addr` until the process is asked to
/// shut down. Blocks for the lifetime of the listener.
pub async fn serve(
    addr: std::net::SocketAddr,
    host_key: KeyPair,
    identity: Arc<IdentityStore>,
    chat: Arc<ChatHub>,
    pairing: Arc<PairingManager<DuplexStream>>,
) -> Result<()> {
    let config = Arc::new(RusshConfig {
        keys: vec![host_key],
        ..Default::default()
    });
    let server = RelayServer::new(identity, chat, pairing);
    russh::server::run(config, addr, server).await?;
    Ok(())
}
