//! In-memory registry mapping each online user to their currently shared
//! catalog of files.
//!
//! The registry never performs I/O on files; it only tracks descriptors
//! advertised by clients via `share` messages.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A single shared file or directory, as advertised by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "IsDir")]
    pub is_directory: bool,
}

/// A registry entry matched by `search` or `top`: the file, its size, and
/// the nickname of the peer advertising it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub size: u64,
    pub peer: String,
}

/// Maps online user → catalog. Lock-free concurrent access via `DashMap`,
/// matching the session-table style used elsewhere in this workspace.
#[derive(Default)]
pub struct FileRegistry {
    catalogs: DashMap<String, Vec<FileDescriptor>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `user`'s catalog wholesale. An empty list evicts the user
    /// entirely; empty-catalog users are not addressable for downloads.
    pub fn replace(&self, user: &str, files: Vec<FileDescriptor>) {
        if files.is_empty() {
            self.catalogs.remove(user);
        } else {
            self.catalogs.insert(user.to_string(), files);
        }
    }

    /// Evict `user`'s catalog entirely, e.g. on control-session termination.
    pub fn remove(&self, user: &str) {
        self.catalogs.remove(user);
    }

    /// Case-insensitive substring search over non-directory file names
    /// across all users. An empty or whitespace-only query yields nothing.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();

        let mut results: Vec<SearchResult> = self
            .catalogs
            .iter()
            .flat_map(|entry| {
                let peer = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .filter(|f| !f.is_directory && f.name.to_lowercase().contains(&needle))
                    .map(|f| SearchResult {
                        file_name: f.name.clone(),
                        size: f.size,
                        peer: peer.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        results.sort_by(|a, b| (a.peer.as_str(), a.file_name.as_str()).cmp(&(b.peer.as_str(), b.file_name.as_str())));
        results
    }

    /// The `n` non-directory entries with the largest size, descending,
    /// with deterministic tie-breaking by `(peer, file name)`.
    pub fn top(&self, n: usize) -> Vec<SearchResult> {
        let mut all: Vec<SearchResult> = self
            .catalogs
            .iter()
            .flat_map(|entry| {
                let peer = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .filter(|f| !f.is_directory)
                    .map(|f| SearchResult {
                        file_name: f.name.clone(),
                        size: f.size,
                        peer: peer.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        all.sort_by(|a, b| {
            b.size
                .cmp(&a.size)
                .then_with(|| a.peer.cmp(&b.peer))
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        all.truncate(n);
        all
    }

    /// Whether `user` currently advertises an exactly-named, non-directory
    /// file.
    pub fn owns(&self, filename: &str, user: &str) -> bool {
        self.catalogs
            .get(user)
            .is_some_and(|files| files.iter().any(|f| !f.is_directory && f.name == filename))
    }

    /// The descriptor for `filename` owned by `user`, if any.
    pub fn lookup(&self, filename: &str, user: &str) -> Option<FileDescriptor> {
        self.catalogs.get(user)?.iter().find(|f| !f.is_directory && f.name == filename).cloned()
    }

    /// Total number of file descriptors across all catalogs, for the status
    /// snapshot.
    pub fn total_files(&self) -> usize {
        self.catalogs.iter().map(|entry| entry.value().len()).sum()
    }
}
