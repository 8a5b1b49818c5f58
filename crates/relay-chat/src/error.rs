use thiserror::Error;

/// Errors surfaced by the chat hub's message handlers: protocol framing,
/// security violations, and delivery failures.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("malformed control message: {0}")]
    Protocol(String),

    #[error("security violation: {0}")]
    Security(String),

    #[error("delivery failed: recipient's outbound queue is full")]
    DeliveryFailed,
}

pub type Result<T> = std::result::Result<T, ChatError>;
