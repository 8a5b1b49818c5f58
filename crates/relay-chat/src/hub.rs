use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use relay_registry::FileRegistry;
use tokio::sync::{mpsc, Mutex};

use crate::error::{ChatError, Result};
use crate::messages::{
    self, ChatBroadcastPayload, GetFilePayload, InboundEnvelope, NetworkStatsPayload,
    RelayedUploadDataPayload, RelayedUploadDonePayload, SearchPayload, SearchResultsPayload,
    SharePayload, SystemBroadcastPayload, TransferErrorPayload, TransferStartPayload,
    UploadDataPayload, UploadDonePayload, UploadErrorPayload, UploadRequestPayload,
};
use crate::types::{new_transfer_id, OnlineClient, TransferRecord, OUTBOUND_QUEUE_DEPTH};

struct HubState {
    clients: HashMap<String, OnlineClient>,
    transfers: HashMap<String, TransferRecord>,
    total_transfers_completed: u64,
    next_generation: u64,
}

/// The control-plane hub: online-client table, transfer table, and the
/// dispatch logic for every inbound message kind. Holds a single lock over
/// its own bookkeeping; the file catalog lives in `FileRegistry`, which
/// locks itself per-entry.
pub struct ChatHub {
    state: Mutex<HubState>,
    registry: Arc<FileRegistry>,
}

/// Handle returned to a newly joined client: the other end of its outbound
/// queue. The caller (the SSH front-end) drains this and writes each line
/// to the client's chat channel.
pub struct ClientHandle {
    pub outbound: mpsc::Receiver<String>,
    /// Identifies this specific session's slot in the client table, so a
    /// stale session's eventual `leave` can't evict whatever reconnected
    /// under the same nickname after it.
    pub generation: u64,
}

/// Point-in-time view of the hub for the status service.
#[derive(Debug, Clone)]
pub struct HubSnapshot {
    pub online_users: Vec<String>,
    pub active_transfers: usize,
    pub total_transfers_completed: u64,
    pub total_files: usize,
}

impl ChatHub {
    pub fn new(registry: Arc<FileRegistry>) -> Self {
        Self {
            state: Mutex::new(HubState {
                clients: HashMap::new(),
                transfers: HashMap::new(),
                total_transfers_completed: 0,
                next_generation: 0,
            }),
            registry,
        }
    }

    /// Admit `nickname` to the hub, evicting any existing session under the
    /// same nickname (the new SSH session wins; the old session's queue is
    /// simply dropped, which closes its writer task).
    pub async fn join(&self, nickname: &str) -> ClientHandle {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let mut state = self.state.lock().await;
        let generation = state.next_generation;
        state.next_generation += 1;
        state.clients.insert(
            nickname.to_string(),
            OnlineClient {
                nickname: nickname.to_string(),
                outbound: tx,
                generation,
            },
        );
        let online = state.clients.len();
        drop(state);
        tracing::info!(nickname, online, "client joined");
        self.broadcast_system(Some(nickname), &format!("{nickname} joined")).await;
        ClientHandle { outbound: rx, generation }
    }

    /// Remove `nickname`'s session `generation` and its file listing.
    /// Idempotent: leaving twice, or leaving a generation that a reconnect
    /// has already overwritten in the client table, is a no-op, so a stale
    /// session's eventual cleanup can never evict a live one.
    pub async fn leave(&self, nickname: &str, generation: u64) {
        let removed = {
            let mut state = self.state.lock().await;
            match state.clients.get(nickname) {
                Some(client) if client.generation == generation => {
                    state.clients.remove(nickname);
                    true
                }
                _ => false,
            }
        };
        if !removed {
            return;
        }
        self.registry.remove(nickname);
        tracing::info!(nickname, "client left");
        self.broadcast_system(Some(nickname), &format!("{nickname} left")).await;
    }

    /// Parse and dispatch one line of client input.
    pub async fn handle_line(&self, nickname: &str, line: &str) -> Result<()> {
        let envelope: InboundEnvelope = serde_json::from_str(line.trim())
            .map_err(|e| ChatError::Protocol(format!("invalid envelope: {e}")))?;

        match envelope.kind.as_str() {
            "share" => self.handle_share(nickname, envelope.payload).await,
            "search" => self.handle_search(nickname, envelope.payload).await,
            "top_files" => self.handle_top_files(nickname).await,
            "get_stats" => self.handle_get_stats(nickname).await,
            "get_file" => self.handle_get_file(nickname, envelope.payload).await,
            "chat_message" => self.handle_chat_message(nickname, envelope.payload).await,
            "upload_data" => self.handle_upload_data(nickname, envelope.payload).await,
            "upload_done" => self.handle_upload_done(nickname, envelope.payload).await,
            "upload_error" => self.handle_upload_error(nickname, envelope.payload).await,
            other => Err(ChatError::Protocol(format!("unknown message type: {other}"))),
        }
    }

    async fn handle_share(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: SharePayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid share payload: {e}")))?;
        self.registry.replace(nickname, payload.files);
        Ok(())
    }

    async fn handle_search(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: SearchPayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid search payload: {e}")))?;
        let results = self.registry.search(&payload.query);
        let _ = self
            .unicast(nickname, "search_results", SearchResultsPayload { results })
            .await;
        Ok(())
    }

    async fn handle_top_files(&self, nickname: &str) -> Result<()> {
        let results = self.registry.top(50);
        let _ = self
            .unicast(nickname, "search_results", SearchResultsPayload { results })
            .await;
        Ok(())
    }

    async fn handle_get_stats(&self, nickname: &str) -> Result<()> {
        let (online_users, active_transfers, total_transfers_completed) = {
            let state = self.state.lock().await;
            (
                state.clients.len(),
                state.transfers.len(),
                state.total_transfers_completed,
            )
        };
        let payload = NetworkStatsPayload {
            online_users,
            total_files: self.registry.total_files(),
            active_transfers,
            total_transfers_completed,
        };
        let _ = self.unicast(nickname, "network_stats", payload).await;
        Ok(())
    }

    async fn handle_get_file(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: GetFilePayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid get_file payload: {e}")))?;

        if payload.peer == nickname {
            let _ = self
                .unicast(
                    nickname,
                    "transfer_error",
                    TransferErrorPayload {
                        message: "You cannot download your own file.".to_string(),
                    },
                )
                .await;
            return Ok(());
        }

        let Some(descriptor) = self.registry.lookup(&payload.file_name, &payload.peer) else {
            let _ = self
                .unicast(
                    nickname,
                    "transfer_error",
                    TransferErrorPayload {
                        message: "File not found or peer does not own it.".to_string(),
                    },
                )
                .await;
            return Ok(());
        };

        let transfer_id = new_transfer_id();
        {
            let mut state = self.state.lock().await;
            state.transfers.insert(
                transfer_id.clone(),
                TransferRecord {
                    id: transfer_id.clone(),
                    file_name: descriptor.name.clone(),
                    size: descriptor.size,
                    from_user: payload.peer.clone(),
                    to_user: nickname.to_string(),
                    created_at: unix_timestamp(),
                },
            );
        }

        let delivered = self
            .unicast(
                &payload.peer,
                "upload_request",
                UploadRequestPayload {
                    transfer_id: transfer_id.clone(),
                    file_name: descriptor.name.clone(),
                },
            )
            .await;
        if delivered.is_err() {
            self.state.lock().await.transfers.remove(&transfer_id);
            let _ = self
                .unicast(
                    nickname,
                    "transfer_error",
                    TransferErrorPayload {
                        message: "Peer is unreachable.".to_string(),
                    },
                )
                .await;
            return Ok(());
        }

        let _ = self
            .unicast(
                nickname,
                "transfer_start",
                TransferStartPayload {
                    transfer_id,
                    file_name: descriptor.name,
                    size: descriptor.size,
                    from_user: payload.peer,
                },
            )
            .await;
        Ok(())
    }

    async fn handle_chat_message(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: messages::ChatMessagePayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid chat_message payload: {e}")))?;
        self.broadcast(
            Some(nickname),
            "chat_broadcast",
            ChatBroadcastPayload {
                timestamp: unix_timestamp(),
                nickname: nickname.to_string(),
                text: payload.text,
            },
        )
        .await;
        Ok(())
    }

    async fn handle_upload_data(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: UploadDataPayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid upload_data payload: {e}")))?;
        let record = self.authorize_transfer(nickname, &payload.transfer_id).await?;
        let transfer_id = payload.transfer_id.clone();
        let delivered = self
            .unicast(
                &record.to_user,
                "upload_data",
                RelayedUploadDataPayload {
                    transfer_id: payload.transfer_id,
                    data: payload.data,
                },
            )
            .await;
        if delivered.is_err() {
            let _ = self
                .unicast(
                    nickname,
                    "transfer_error",
                    TransferErrorPayload {
                        message: "Recipient is unreachable.".to_string(),
                    },
                )
                .await;
            self.state.lock().await.transfers.remove(&transfer_id);
        }
        Ok(())
    }

    async fn handle_upload_done(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: UploadDonePayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid upload_done payload: {e}")))?;
        let record = self.authorize_transfer(nickname, &payload.transfer_id).await?;
        {
            let mut state = self.state.lock().await;
            state.transfers.remove(&payload.transfer_id);
            state.total_transfers_completed += 1;
        }
        let _ = self
            .unicast(
                &record.to_user,
                "upload_done",
                RelayedUploadDonePayload {
                    transfer_id: payload.transfer_id,
                },
            )
            .await;
        Ok(())
    }

    async fn handle_upload_error(&self, nickname: &str, payload: serde_json::Value) -> Result<()> {
        let payload: UploadErrorPayload = serde_json::from_value(payload)
            .map_err(|e| ChatError::Protocol(format!("invalid upload_error payload: {e}")))?;
        let record = self.authorize_transfer(nickname, &payload.transfer_id).await?;
        {
            let mut state = self.state.lock().await;
            state.transfers.remove(&payload.transfer_id);
        }
        let _ = self
            .unicast(
                &record.to_user,
                "transfer_error",
                TransferErrorPayload {
                    message: payload.message,
                },
            )
            .await;
        Ok(())
    }

    /// A point-in-time view of the hub's bookkeeping for the status
    /// service, taken under the same lock that guards mutation.
    pub async fn snapshot(&self) -> HubSnapshot {
        let state = self.state.lock().await;
        let mut online: Vec<String> = state.clients.keys().cloned().collect();
        online.sort();
        HubSnapshot {
            online_users: online,
            active_transfers: state.transfers.len(),
            total_transfers_completed: state.total_transfers_completed,
            total_files: self.registry.total_files(),
        }
    }

    /// Confirm `nickname` is the registered sender (`from_user`) of
    /// `transfer_id` before relaying any transfer-control traffic for it.
    /// A mismatch is a security violation: logged and rejected, never
    /// answered, so a misbehaving client learns nothing about the transfer.
    async fn authorize_transfer(&self, nickname: &str, transfer_id: &str) -> Result<TransferRecord> {
        let state = self.state.lock().await;
        match state.transfers.get(transfer_id) {
            Some(record) if record.from_user == nickname => Ok(record.clone()),
            Some(record) => {
                tracing::warn!(
                    nickname,
                    transfer_id,
                    expected = %record.from_user,
                    "rejected transfer-control message from non-owning client"
                );
                Err(ChatError::Security(format!(
                    "{nickname} is not the sender for transfer {transfer_id}"
                )))
            }
            None => Err(ChatError::Protocol(format!("unknown transfer id {transfer_id}"))),
        }
    }

    /// Deliver one line to a single named client. Returns `DeliveryFailed`
    /// if the client is offline or its queue is full, so transfer-control
    /// callers can surface the failure as their own `transfer_error` reply;
    /// chat-facing callers are free to ignore the result.
    async fn unicast(&self, nickname: &str, kind: &str, payload: impl serde::Serialize) -> Result<()> {
        let line = messages::encode(kind, payload);
        let state = self.state.lock().await;
        match state.clients.get(nickname) {
            Some(client) if client.outbound.try_send(line).is_ok() => Ok(()),
            Some(_) => {
                tracing::warn!(nickname, kind, "outbound queue full, message dropped");
                Err(ChatError::DeliveryFailed)
            }
            None => {
                tracing::warn!(nickname, kind, "recipient offline, message dropped");
                Err(ChatError::DeliveryFailed)
            }
        }
    }

    /// Fan a line out to every online client except `origin`, dropping it
    /// for whichever clients currently have a full queue (lossy, per the
    /// chat broadcast contract).
    async fn broadcast(&self, origin: Option<&str>, kind: &str, payload: impl serde::Serialize) {
        let line = messages::encode(kind, payload);
        let state = self.state.lock().await;
        for (name, client) in state.clients.iter() {
            if Some(name.as_str()) == origin {
                continue;
            }
            let _ = client.outbound.try_send(line.clone());
        }
    }

    async fn broadcast_system(&self, origin: Option<&str>, text: &str) {
        self.broadcast(
            origin,
            "system_broadcast",
            SystemBroadcastPayload {
                timestamp: unix_timestamp(),
                text: text.to_string(),
            },
        )
        .await;
    }
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_registry::FileDescriptor;

    fn registry() -> Arc<FileRegistry> {
        Arc::new(FileRegistry::new())
    }

    async fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.push(serde_json::from_str(&line).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn join_and_leave_broadcast_system_messages() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        drain(&mut alice.outbound).await;

        let bob = hub.join("bob").await;
        let alice_msgs = drain(&mut alice.outbound).await;
        assert_eq!(alice_msgs[0]["type"], "system_broadcast");
        assert!(alice_msgs[0]["payload"]["text"].as_str().unwrap().contains("bob joined"));

        hub.leave("bob", bob.generation).await;
        let alice_msgs = drain(&mut alice.outbound).await;
        assert!(alice_msgs[0]["payload"]["text"].as_str().unwrap().contains("bob left"));
    }

    #[tokio::test]
    async fn join_does_not_hear_its_own_join_notice() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        assert!(drain(&mut alice.outbound).await.is_empty());
    }

    #[tokio::test]
    async fn stale_session_leave_does_not_evict_a_reconnected_session() {
        let hub = ChatHub::new(registry());
        let first = hub.join("alice").await;
        let second = hub.join("alice").await;

        hub.leave("alice", first.generation).await;
        assert!(hub.snapshot().await.online_users.contains(&"alice".to_string()));

        hub.leave("alice", second.generation).await;
        assert!(!hub.snapshot().await.online_users.contains(&"alice".to_string()));
    }

    #[tokio::test]
    async fn get_file_rejects_own_file_request() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        drain(&mut alice.outbound).await;

        hub.handle_line(
            "alice",
            r#"{"type":"get_file","payload":{"fileName":"a.txt","peer":"alice"}}"#,
        )
        .await
        .unwrap();

        let msgs = drain(&mut alice.outbound).await;
        assert_eq!(msgs[0]["type"], "transfer_error");
    }

    #[tokio::test]
    async fn get_file_happy_path_notifies_both_sides() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        let mut bob = hub.join("bob").await;
        drain(&mut alice.outbound).await;
        drain(&mut bob.outbound).await;

        hub.registry.replace(
            "bob",
            vec![FileDescriptor {
                name: "movie.mp4".to_string(),
                size: 1024,
                is_directory: false,
            }],
        );

        hub.handle_line(
            "alice",
            r#"{"type":"get_file","payload":{"fileName":"movie.mp4","peer":"bob"}}"#,
        )
        .await
        .unwrap();

        let bob_msgs = drain(&mut bob.outbound).await;
        assert_eq!(bob_msgs[0]["type"], "upload_request");
        let transfer_id = bob_msgs[0]["payload"]["transferID"].as_str().unwrap().to_string();

        let alice_msgs = drain(&mut alice.outbound).await;
        assert_eq!(alice_msgs[0]["type"], "transfer_start");
        assert_eq!(alice_msgs[0]["payload"]["transferID"], transfer_id);

        hub.handle_line(
            "bob",
            &format!(r#"{{"type":"upload_data","payload":{{"transferID":"{transfer_id}","data":"aGVsbG8="}}}}"#),
        )
        .await
        .unwrap();
        let alice_msgs = drain(&mut alice.outbound).await;
        assert_eq!(alice_msgs[0]["type"], "upload_data");

        hub.handle_line(
            "bob",
            &format!(r#"{{"type":"upload_done","payload":{{"transferID":"{transfer_id}"}}}}"#),
        )
        .await
        .unwrap();
        let alice_msgs = drain(&mut alice.outbound).await;
        assert_eq!(alice_msgs[0]["type"], "upload_done");
    }

    #[tokio::test]
    async fn get_file_reports_transfer_error_when_peer_is_unreachable() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        drain(&mut alice.outbound).await;

        // bob has shared a file but is not (or is no longer) connected.
        hub.registry.replace(
            "bob",
            vec![FileDescriptor {
                name: "movie.mp4".to_string(),
                size: 1024,
                is_directory: false,
            }],
        );

        hub.handle_line(
            "alice",
            r#"{"type":"get_file","payload":{"fileName":"movie.mp4","peer":"bob"}}"#,
        )
        .await
        .unwrap();

        let alice_msgs = drain(&mut alice.outbound).await;
        assert_eq!(alice_msgs[0]["type"], "transfer_error");
        assert_eq!(hub.snapshot().await.active_transfers, 0);
    }

    #[tokio::test]
    async fn non_owning_client_cannot_relay_transfer_control() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        let mut bob = hub.join("bob").await;
        let mut mallory = hub.join("mallory").await;
        drain(&mut alice.outbound).await;
        drain(&mut bob.outbound).await;
        drain(&mut mallory.outbound).await;

        hub.registry.replace(
            "bob",
            vec![FileDescriptor {
                name: "a.txt".to_string(),
                size: 5,
                is_directory: false,
            }],
        );
        hub.handle_line(
            "alice",
            r#"{"type":"get_file","payload":{"fileName":"a.txt","peer":"bob"}}"#,
        )
        .await
        .unwrap();
        let bob_msgs = drain(&mut bob.outbound).await;
        let transfer_id = bob_msgs[0]["payload"]["transferID"].as_str().unwrap().to_string();
        drain(&mut alice.outbound).await;

        let result = hub
            .handle_line(
                "mallory",
                &format!(r#"{{"type":"upload_data","payload":{{"transferID":"{transfer_id}","data":"eHh4"}}}}"#),
            )
            .await;
        assert!(matches!(result, Err(ChatError::Security(_))));
        assert!(drain(&mut alice.outbound).await.is_empty());
    }

    #[tokio::test]
    async fn chat_message_broadcasts_to_everyone_but_the_sender() {
        let hub = ChatHub::new(registry());
        let mut alice = hub.join("alice").await;
        let mut bob = hub.join("bob").await;
        drain(&mut alice.outbound).await;
        drain(&mut bob.outbound).await;

        hub.handle_line("alice", r#"{"type":"chat_message","payload":{"text":"hi all"}}"#)
            .await
            .unwrap();

        assert!(drain(&mut alice.outbound).await.is_empty());
        let bob_msgs = drain(&mut bob.outbound).await;
        assert_eq!(bob_msgs[0]["type"], "chat_broadcast");
        assert_eq!(bob_msgs[0]["payload"]["text"], "hi all");
    }

    #[tokio::test]
    async fn unknown_message_type_is_a_protocol_error() {
        let hub = ChatHub::new(registry());
        hub.join("alice").await;
        let result = hub.handle_line("alice", r#"{"type":"nope","payload":{}}"#).await;
        assert!(matches!(result, Err(ChatError::Protocol(_))));
    }
}
