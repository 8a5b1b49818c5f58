use thiserror::Error;

/// Errors surfaced by the SSH front-end: transport/handshake failures from
/// the underlying library, and the front-end's own protocol-classification
/// rejections.
#[derive(Debug, Error)]
pub enum SshError {
    #[error("ssh transport error: {0}")]
    Transport(#[from] russh::Error),

    #[error("ssh listener I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel produced no nickname before a request arrived")]
    MissingNickname,
}

pub type Result<T> = std::result::Result<T, SshError>;
