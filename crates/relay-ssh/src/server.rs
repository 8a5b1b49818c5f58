use std::net::SocketAddr;
use std::sync::Arc;

use relay_chat::ChatHub;
use relay_identity::IdentityStore;
use relay_pairing::PairingManager;
use russh::server::Server;
use tokio::io::DuplexStream;

use crate::handler::RelayHandler;

/// Factory for per-connection [`RelayHandler`]s, holding the collaborators
/// every session shares: the Identity Store, Chat Hub, and Pairing Manager.
#[derive(Clone)]
pub struct RelayServer {
    identity: Arc<IdentityStore>,
    chat: Arc<ChatHub>,
    pairing: Arc<PairingManager<DuplexStream>>,
}

impl RelayServer {
    pub fn new(
        identity: Arc<IdentityStore>,
        chat: Arc<ChatHub>,
        pairing: Arc<PairingManager<DuplexStream>>,
    ) -> Self {
        Self { identity, chat, pairing }
    }
}

impl Server for RelayServer {
    type Handler = RelayHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> RelayHandler {
        tracing::debug!(?peer_addr, "accepted ssh connection");
        RelayHandler::new(
            Arc::clone(&self.identity),
            Arc::clone(&self.chat),
            Arc::clone(&self.pairing),
        )
    }

    fn handle_session_error(&mut self, error: <Self::Handler as russh::server::Handler>::Error) {
        tracing::warn!(error = %error, "ssh session ended with an error");
    }
}
