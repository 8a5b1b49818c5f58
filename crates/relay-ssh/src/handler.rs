use std::collections::HashMap;
use std::sync::Arc;

use relay_chat::ChatHub;
use relay_identity::{IdentityStore, Registration};
use relay_pairing::PairingManager;
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId};
use russh_keys::key::PublicKey;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf, split};

use crate::error::SshError;
use crate::subsystem::{classify, subsystem_name_from_exec_command, ChannelRole};

const CHANNEL_BUFFER: usize = 64 * 1024;

const SHELL_REFUSAL_BANNER: &str =
    "This server does not provide an interactive shell; connect the chat or data-transfer subsystem.\r\n";

/// Per-connection SSH handler. One instance is constructed per inbound
/// session by [`RelayServer::new_client`]; it owns nothing beyond the
/// bookkeeping needed to classify channels and hand them off.
pub struct RelayHandler {
    identity: Arc<IdentityStore>,
    chat: Arc<ChatHub>,
    pairing: Arc<PairingManager<DuplexStream>>,
    nickname: Option<String>,
    channels: HashMap<ChannelId, WriteHalf<DuplexStream>>,
}

impl RelayHandler {
    pub fn new(
        identity: Arc<IdentityStore>,
        chat: Arc<ChatHub>,
        pairing: Arc<PairingManager<DuplexStream>>,
    ) -> Self {
        Self {
            identity,
            chat,
            pairing,
            nickname: None,
            channels: HashMap::new(),
        }
    }

    /// Construct a duplex pair for `channel_id`: the "local" half is handed
    /// to the chat hub or pairing manager; the "remote" half's read side is
    /// forwarded to the SSH transport via `handle`, and its write side is
    /// retained so the `data` callback can push inbound SSH bytes into it.
    fn open_duplex(&mut self, channel_id: ChannelId, handle: Handle) -> DuplexStream {
        let (local, remote) = tokio::io::duplex(CHANNEL_BUFFER);
        let (mut remote_reader, remote_writer) = split(remote);
        self.channels.insert(channel_id, remote_writer);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 16 * 1024];
            loop {
                match remote_reader.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if handle.data(channel_id, buf[..n].to_vec().into()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        local
    }

    async fn dispatch_role(&mut self, role: ChannelRole, channel_id: ChannelId, session: &mut Session) {
        match role {
            ChannelRole::Chat => {
                let Some(nickname) = self.nickname.clone() else {
                    session.channel_failure(channel_id);
                    return;
                };
                let local = self.open_duplex(channel_id, session.handle());
                session.channel_success(channel_id);
                let chat = Arc::clone(&self.chat);
                tokio::spawn(run_chat_channel(chat, nickname, local));
            }
            ChannelRole::DataTransfer { transfer_id, stream_index } => {
                let local = self.open_duplex(channel_id, session.handle());
                session.channel_success(channel_id);
                let pairing = Arc::clone(&self.pairing);
                tokio::spawn(async move {
                    pairing.pair((transfer_id, stream_index), local).await;
                });
            }
        }
    }

    async fn reject_request(&self, channel_id: ChannelId, session: &mut Session) {
        session.channel_failure(channel_id);
    }
}

/// Drive one chat control channel end to end: line-buffered JSON reads
/// dispatched through the hub, and the hub's outbound queue drained back
/// onto the channel. Runs until either side closes.
async fn run_chat_channel(chat: Arc<ChatHub>, nickname: String, channel: DuplexStream) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let handle = chat.join(&nickname).await;
    let generation = handle.generation;
    let (read_half, mut write_half) = tokio::io::split(channel);
    let mut lines = BufReader::new(read_half).lines();

    let mut outbound = handle.outbound;
    let writer = tokio::spawn(async move {
        while let Some(line) = outbound.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                if let Err(e) = chat.handle_line(&nickname, &line).await {
                    tracing::warn!(nickname = %nickname, error = %e, "rejected control message");
                }
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    writer.abort();
    chat.leave(&nickname, generation).await;
}

impl russh::server::Handler for RelayHandler {
    type Error = SshError;

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        if user.is_empty() {
            return Ok(Auth::Reject { proceed_with_methods: None });
        }
        match self.identity.register_or_check(user, public_key).await {
            Registration::Registered | Registration::Accepted => {
                self.nickname = Some(user.to_string());
                Ok(Auth::Accept)
            }
            Registration::Conflict => {
                tracing::warn!(user, "public key conflicts with bound identity");
                Ok(Auth::Reject { proceed_with_methods: None })
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        match classify(name) {
            Some(role) => self.dispatch_role(role, channel_id, session).await,
            None => self.reject_request(channel_id, session).await,
        }
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data);
        let name = subsystem_name_from_exec_command(&command);
        match name.and_then(classify) {
            Some(role) => self.dispatch_role(role, channel_id, session).await,
            None => self.reject_request(channel_id, session).await,
        }
        Ok(())
    }

    async fn shell_request(&mut self, channel_id: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        session.channel_success(channel_id);
        session.data(channel_id, SHELL_REFUSAL_BANNER.as_bytes().to_vec().into());
        session.close(channel_id);
        Ok(())
    }

    async fn data(&mut self, channel_id: ChannelId, data: &[u8], _session: &mut Session) -> Result<(), Self::Error> {
        if let Some(writer) = self.channels.get_mut(&channel_id) {
            let _ = writer.write_all(data).await;
        }
        Ok(())
    }
}
