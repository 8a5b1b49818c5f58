pub mod error;
mod hub;
mod messages;
mod types;

pub use error::{ChatError, Result};
pub use hub::{ChatHub, ClientHandle, HubSnapshot};
pub use types::OUTBOUND_QUEUE_DEPTH;
