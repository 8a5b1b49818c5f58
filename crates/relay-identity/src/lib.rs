//! Persistent nickname ↔ public-key identity store.
//!
//! A nickname is bound to a key on first authenticated presentation and the
//! binding is then immutable for the lifetime of the on-disk record: a later
//! login under the same nickname must present the same key, or is refused.

mod error;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use russh_keys::key::PublicKey;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub use error::{IdentityError, Result};

/// Outcome of presenting a `(nickname, key)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Nickname was unbound and is now bound to the presented key.
    Registered,
    /// Nickname was already bound to this exact key.
    Accepted,
    /// Nickname is bound to a different key; authentication must be refused.
    Conflict,
}

/// The canonical serialized form of a presented key, as stored on disk.
fn fingerprint(key: &PublicKey) -> String {
    STANDARD.encode(key.public_key_bytes())
}

struct Inner {
    path: PathBuf,
    bindings: HashMap<String, String>,
}

/// Serializes `register-or-check` and all reads/writes behind one lock.
pub struct IdentityStore {
    inner: Mutex<Inner>,
}

impl IdentityStore {
    /// Load bindings from `path`, tolerating malformed lines. A missing file
    /// is treated as an empty store (first run); any other I/O failure is
    /// fatal.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let mut bindings = HashMap::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.split_once(' ') {
                Some((nickname, key_b64)) if !nickname.is_empty() && !key_b64.is_empty() => {
                    bindings.insert(nickname.to_string(), key_b64.to_string());
                }
                _ => {
                    tracing::warn!(line = lineno, "skipping malformed identity record");
                }
            }
        }

        tracing::info!(count = bindings.len(), path = %path.display(), "loaded identity store");
        Ok(Self {
            inner: Mutex::new(Inner { path, bindings }),
        })
    }

    /// Present `(nickname, key)`. Binds unknown nicknames, accepts matching
    /// rebinds, and refuses conflicting ones. A persistence failure after a
    /// successful in-memory bind is logged but never surfaces to the caller.
    pub async fn register_or_check(&self, nickname: &str, key: &PublicKey) -> Registration {
        let presented = fingerprint(key);
        let mut inner = self.inner.lock().await;

        match inner.bindings.get(nickname) {
            Some(existing) if *existing == presented => Registration::Accepted,
            Some(_) => Registration::Conflict,
            None => {
                inner.bindings.insert(nickname.to_string(), presented);
                if let Err(e) = Self::persist(&inner.path, &inner.bindings).await {
                    tracing::error!(error = %e, nickname, "failed to persist identity store");
                }
                tracing::info!(nickname, "registered new identity");
                Registration::Registered
            }
        }
    }

    async fn persist(path: &Path, bindings: &HashMap<String, String>) -> Result<()> {
        let mut buf = String::new();
        for (nickname, key_b64) in bindings {
            buf.push_str(nickname);
            buf.push(' ');
            buf.push_str(key_b64);
            buf.push('\n');
        }

        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, buf).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }

    /// Number of bound nicknames, for diagnostics.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.bindings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_keys::key::KeyPair;

    fn test_key() -> PublicKey {
        KeyPair::generate_ed25519().public_key()
    }

    #[tokio::test]
    async fn first_presentation_registers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");
        let store = IdentityStore::load(&path).await.unwrap();

        let key = test_key();
        assert_eq!(
            store.register_or_check("alice", &key).await,
            Registration::Registered
        );
    }

    #[tokio::test]
    async fn reconnect_with_same_key_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");
        let store = IdentityStore::load(&path).await.unwrap();

        let key = test_key();
        store.register_or_check("alice", &key).await;
        assert_eq!(
            store.register_or_check("alice", &key).await,
            Registration::Accepted
        );
    }

    #[tokio::test]
    async fn reconnect_with_different_key_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");
        let store = IdentityStore::load(&path).await.unwrap();

        let k1 = test_key();
        let k2 = test_key();
        store.register_or_check("alice", &k1).await;
        assert_eq!(
            store.register_or_check("alice", &k2).await,
            Registration::Conflict
        );
    }

    #[tokio::test]
    async fn bindings_round_trip_through_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");

        let key = test_key();
        {
            let store = IdentityStore::load(&path).await.unwrap();
            store.register_or_check("bob", &key).await;
        }

        let reloaded = IdentityStore::load(&path).await.unwrap();
        assert_eq!(
            reloaded.register_or_check("bob", &key).await,
            Registration::Accepted
        );
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");
        tokio::fs::write(&path, "not-a-valid-line\n\nalice ZmFrZQ==\n")
            .await
            .unwrap();

        let store = IdentityStore::load(&path).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    proptest::proptest! {
        // For any nickname, presenting two different keys in sequence must
        // accept exactly one of them and refuse the other with `Conflict`.
        #[test]
        fn conflicting_keys_never_both_succeed(nickname in "[a-zA-Z0-9_]{1,16}") {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let dir = tempfile::tempdir().unwrap();
                let path = dir.path().join("identities.db");
                let store = IdentityStore::load(&path).await.unwrap();

                let k1 = test_key();
                let k2 = test_key();

                let first = store.register_or_check(&nickname, &k1).await;
                let second = store.register_or_check(&nickname, &k2).await;

                prop_assert_eq!(first, Registration::Registered);
                prop_assert_eq!(second, Registration::Conflict);
                Ok(())
            })?;
        }
    }
}
