//! Error types for the relay

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while relaying messages
#[derive(Error, Debug)]
pub enum Error {
    /// Inbound payload is blank, not JSON, or not a JSON object
    #[error("Malformed payload: {0}")]
    Parse(String),

    /// Target user has no live connection on this node
    #[error("User not online: {0}")]
    RecipientUnreachable(String),

    /// The target is registered but the hand-off to its connection failed
    #[error("Delivery to {user_id} failed: {reason}")]
    DeliveryFailed { user_id: String, reason: String },

    /// Send attempted on a connection that is already closed
    #[error("Connection for {0} is closed")]
    NotConnected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}
