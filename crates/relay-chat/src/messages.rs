//! Control-channel wire format: UTF-8, newline-delimited JSON objects of the
//! shape `{"type": <string>, "payload": <object>}`.

use relay_registry::{FileDescriptor, SearchResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outer envelope every control message is wrapped in.
#[derive(Debug, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

/// Serialize `payload` as the newline-terminated envelope this protocol
/// sends on the wire.
pub fn encode(kind: &str, payload: impl Serialize) -> String {
    #[derive(Serialize)]
    struct Envelope<'a, T> {
        #[serde(rename = "type")]
        kind: &'a str,
        payload: T,
    }
    let mut line =
        serde_json::to_string(&Envelope { kind, payload }).expect("outbound payloads always serialize");
    line.push('\n');
    line
}

#[derive(Debug, Deserialize)]
pub struct SharePayload {
    pub files: Vec<FileDescriptor>,
}

#[derive(Debug, Deserialize)]
pub struct SearchPayload {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct GetFilePayload {
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub peer: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessagePayload {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadDataPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadDonePayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadErrorPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResultsPayload {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Serialize)]
pub struct NetworkStatsPayload {
    pub online_users: usize,
    pub total_files: usize,
    pub active_transfers: usize,
    pub total_transfers_completed: u64,
}

#[derive(Debug, Serialize)]
pub struct TransferErrorPayload {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TransferStartPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub size: u64,
    #[serde(rename = "fromUser")]
    pub from_user: String,
}

#[derive(Debug, Serialize)]
pub struct UploadRequestPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct ChatBroadcastPayload {
    pub timestamp: u64,
    pub nickname: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SystemBroadcastPayload {
    pub timestamp: u64,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RelayedUploadDataPayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct RelayedUploadDonePayload {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
}
