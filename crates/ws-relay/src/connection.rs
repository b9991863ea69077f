//! Live connection handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Metadata about a connection
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// When the handshake completed
    pub connected_at: chrono::DateTime<chrono::Utc>,
    /// Client IP address (if available)
    pub client_ip: Option<String>,
    /// User agent (if available)
    pub user_agent: Option<String>,
}

/// One live transport session bound to a user identity.
///
/// The handle is cheap to clone; all clones share the same outbound queue
/// and the same open/closed flag. The receiving half of the queue is owned
/// by the writer task that forwards text frames onto the socket.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique per-session ID, distinguishes reconnects of the same user
    pub id: String,
    /// Identity this session was opened for
    pub user_id: String,
    /// Outbound text frames
    sender: mpsc::Sender<String>,
    open: Arc<AtomicBool>,
    shutdown: CancellationToken,
    /// Connection metadata
    pub metadata: ConnectionMetadata,
}

impl Connection {
    /// Create a new connection with an outbound queue of `capacity` frames
    pub fn new(user_id: impl Into<String>, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        Self::with_metadata(user_id, capacity, None, None)
    }

    /// Create a new connection, recording where it came from
    pub fn with_metadata(
        user_id: impl Into<String>,
        capacity: usize,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let connection = Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            sender,
            open: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            metadata: ConnectionMetadata {
                connected_at: chrono::Utc::now(),
                client_ip,
                user_agent,
            },
        };
        (connection, receiver)
    }

    /// Open and still attached to a writer
    pub fn is_alive(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Queue a text frame for this connection.
    ///
    /// Never waits on the peer: a full queue is reported as a failed
    /// delivery rather than stalling the caller.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::NotConnected(self.user_id.clone()));
        }
        self.sender.try_send(text.into()).map_err(|e| match e {
            TrySendError::Full(_) => Error::DeliveryFailed {
                user_id: self.user_id.clone(),
                reason: "outbound queue full".to_string(),
            },
            TrySendError::Closed(_) => Error::DeliveryFailed {
                user_id: self.user_id.clone(),
                reason: "transport closed".to_string(),
            },
        })
    }

    /// Mark the connection closed. Returns false if it already was.
    pub fn close(&self) -> bool {
        let was_open = self.open.swap(false, Ordering::AcqRel);
        self.shutdown.cancel();
        was_open
    }

    /// Resolves once `close` has been called on any clone
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Whether `close` has been called on any clone
    pub fn is_closed(&self) -> bool {
        !self.open.load(Ordering::Acquire)
    }
}
