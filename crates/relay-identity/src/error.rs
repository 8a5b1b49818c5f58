use thiserror::Error;

/// Errors that can occur while loading or persisting the identity store.
///
/// A load error at startup is fatal; a save error after a successful
/// in-memory bind is logged and otherwise ignored by callers.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize public key: {0}")]
    KeyEncoding(String),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
