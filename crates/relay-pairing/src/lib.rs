//! Rendezvous pairing manager for bulk-data channels.
//!
//! The first channel to arrive for a `(transfer_id, stream_index)` key parks
//! under a deadline; the second arrival triggers a bidirectional splice.
//! This manager never inspects or buffers payload bytes; it is a pure
//! rendezvous point, which keeps the relay's memory footprint proportional
//! to users, not data.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Identifies one rendezvous slot: a transfer id paired with the substream
/// index within that transfer.
pub type PairKey = (String, u32);

/// Default parking deadline before an unmatched channel is closed.
pub const PAIR_TIMEOUT: Duration = Duration::from_secs(30);

struct Parked<S> {
    channel: S,
    token: u64,
}

/// Rendezvous map keyed by `(transfer_id, stream_index)`, one lock, map
/// operations only.
pub struct PairingManager<S> {
    pending: Arc<Mutex<HashMap<PairKey, Parked<S>>>>,
    timeout: Duration,
    next_token: AtomicU64,
}

impl<S> Default for PairingManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn default() -> Self {
        Self::new(PAIR_TIMEOUT)
    }
}

impl<S> PairingManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            next_token: AtomicU64::new(0),
        }
    }

    /// Register `channel` for `key`. If a channel is already parked under
    /// `key`, it is removed and the two are spliced; otherwise `channel`
    /// parks behind a deadline watchdog.
    pub async fn pair(&self, key: PairKey, channel: S) {
        let mut pending = self.pending.lock().await;
        if let Some(parked) = pending.remove(&key) {
            drop(pending);
            tracing::debug!(transfer_id = %key.0, stream_index = key.1, "data channel paired");
            tokio::spawn(splice(parked.channel, channel));
            return;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        pending.insert(key.clone(), Parked { channel, token });
        drop(pending);

        tracing::debug!(transfer_id = %key.0, stream_index = key.1, "data channel parked");
        let pending_map = Arc::clone(&self.pending);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut pending = pending_map.lock().await;
            let still_same = matches!(pending.get(&key), Some(p) if p.token == token);
            if still_same {
                if let Some(mut parked) = pending.remove(&key) {
                    drop(pending);
                    tracing::debug!(
                        transfer_id = %key.0,
                        stream_index = key.1,
                        "pairing deadline expired, closing parked channel"
                    );
                    let _ = parked.channel.shutdown().await;
                }
            }
        });
    }

    /// Number of channels currently parked, for diagnostics/tests.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Two concurrent one-way copies, one per direction. Whichever side
/// completes first ends the splice; both halves are dropped (and so
/// closed) when this function returns, giving a single-closure guarantee.
async fn splice<S>(a: S, b: S)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ar, mut aw) = tokio::io::split(a);
    let (mut br, mut bw) = tokio::io::split(b);

    let a_to_b = tokio::io::copy(&mut ar, &mut bw);
    let b_to_a = tokio::io::copy(&mut br, &mut aw);

    tokio::select! {
        result = a_to_b => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "splice a->b ended");
            }
        }
        result = b_to_a => {
            if let Err(e) = result {
                tracing::debug!(error = %e, "splice b->a ended");
            }
        }
    }
    // Dropping both split halves here closes both underlying channels.
}
