use rand::RngCore;
use tokio::sync::mpsc;

/// Bound on each client's outbound queue. Chat broadcast is lossy past this
/// point; transfer-control unicast reports delivery failure instead of
/// silently dropping.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// A client currently joined to the hub. `generation` identifies this
/// specific session, so a reconnect under the same nickname can tell its
/// predecessor's eventual cleanup apart from its own.
pub struct OnlineClient {
    pub nickname: String,
    pub outbound: mpsc::Sender<String>,
    pub generation: u64,
}

/// A transfer handed out by `get_file`, pending or in progress.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub from_user: String,
    pub to_user: String,
    pub created_at: u64,
}

/// Render a fresh 128-bit transfer id as 32 lowercase hex digits.
pub fn new_transfer_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_ids_are_32_hex_digits() {
        let id = new_transfer_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn transfer_ids_are_not_trivially_repeated() {
        let a = new_transfer_id();
        let b = new_transfer_id();
        assert_ne!(a, b);
    }
}
