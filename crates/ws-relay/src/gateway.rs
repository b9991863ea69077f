//! Per-connection lifecycle
//!
//! A [`Gateway`] is created for every accepted WebSocket and walks through
//! `Connecting -> Open -> Closed` exactly once. Each transport event has one
//! entry point: [`Gateway::open`], [`Gateway::on_frame`],
//! [`Gateway::on_error`] and [`Gateway::close`]. [`Gateway::run`] drives
//! them from a live socket.

use std::fmt::Display;

use tracing::{debug, error, info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::is_blank;
use crate::registry::Registry;
use crate::router::{RouteOutcome, Router};

/// Default acknowledgment sent when a session opens
pub const DEFAULT_GREETING: &str = "connected";

/// Default outbound queue size per connection
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 256;

/// Lifecycle state of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Connecting,
    Open,
    Closed,
}

/// Per-session settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Text sent to a client once its session is registered
    pub greeting: String,
    /// Outbound frames buffered per connection before sends fail
    pub send_queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            greeting: DEFAULT_GREETING.to_string(),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
        }
    }
}

/// Binds one transport session to a user identity
pub struct Gateway {
    user_id: String,
    registry: Registry,
    router: Router,
    config: GatewayConfig,
    state: GatewayState,
    connection: Option<Connection>,
}

impl Gateway {
    pub fn new(
        user_id: impl Into<String>,
        registry: Registry,
        router: Router,
        config: GatewayConfig,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            registry,
            router,
            config,
            state: GatewayState::Connecting,
            connection: None,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    /// Create the connection handle for this session
    pub fn connect(&self) -> (Connection, tokio::sync::mpsc::Receiver<String>) {
        Connection::new(self.user_id.clone(), self.config.send_queue_capacity)
    }

    /// Handshake completed: register and greet.
    ///
    /// Returns false if the session was not in `Connecting` or the
    /// connection belongs to another user. A rejected connection is closed.
    pub fn open(&mut self, connection: Connection) -> bool {
        if self.state != GatewayState::Connecting {
            warn!(user_id = %self.user_id, state = ?self.state, "Ignoring open in wrong state");
            return false;
        }
        if connection.user_id != self.user_id {
            warn!(
                user_id = %self.user_id,
                connection_user_id = %connection.user_id,
                "Rejecting connection bound to another user"
            );
            connection.close();
            return false;
        }
        self.state = GatewayState::Open;

        if let Some(previous) = self.registry.register(connection.clone()) {
            if previous.id != connection.id {
                debug!(user_id = %self.user_id, connection_id = %previous.id, "Closing superseded connection");
                previous.close();
            }
        }

        // A lost greeting leaves the registration in place.
        if let Err(e) = connection.send(self.config.greeting.as_str()) {
            error!(user_id = %self.user_id, error = %e, "Failed to send greeting");
        }

        self.connection = Some(connection);
        true
    }

    /// Inbound text frame. Blank frames and frames outside `Open` are skipped.
    pub fn on_frame(&self, text: &str) -> Option<RouteOutcome> {
        if self.state != GatewayState::Open {
            return None;
        }
        info!(user_id = %self.user_id, payload = text, "User message");
        if is_blank(text) {
            return None;
        }
        Some(self.router.route(&self.user_id, text))
    }

    /// Transport error. Only logged; the read loop ends and `close` follows.
    pub fn on_error(&self, err: impl Display) {
        error!(user_id = %self.user_id, error = %err, "Transport error");
    }

    /// Enter `Closed` and drop this session's registration.
    ///
    /// Runs at most once; later calls return false.
    pub fn close(&mut self) -> bool {
        if self.state == GatewayState::Closed {
            return false;
        }
        self.state = GatewayState::Closed;

        if let Some(connection) = &self.connection {
            connection.close();
            self.registry
                .unregister_connection(&self.user_id, &connection.id);
        }
        info!(
            user_id = %self.user_id,
            online_count = self.registry.online_count(),
            "Session closed"
        );
        true
    }

    /// Send a text frame to this session's own client
    pub fn send_message(&self, text: &str) -> Result<()> {
        match (&self.state, &self.connection) {
            (GatewayState::Open, Some(connection)) => connection.send(text),
            _ => Err(Error::NotConnected(self.user_id.clone())),
        }
    }
}

#[cfg(feature = "server")]
mod socket {
    use axum::extract::ws::{Message, WebSocket};
    use futures::stream::SplitSink;
    use futures::{SinkExt, StreamExt};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_stream::wrappers::ReceiverStream;
    use tracing::debug;

    use super::Gateway;
    use crate::connection::Connection;

    impl Gateway {
        /// Drive the session over a live socket until either side goes away
        pub async fn run(
            mut self,
            socket: WebSocket,
            connection: Connection,
            receiver: mpsc::Receiver<String>,
        ) {
            let (sink, mut stream) = socket.split();
            let mut send_task = writer_loop(receiver, sink);

            if !self.open(connection.clone()) {
                send_task.abort();
                return;
            }

            loop {
                tokio::select! {
                    _ = connection.closed() => {
                        debug!(user_id = %self.user_id, "Connection closed locally");
                        break;
                    }
                    _ = &mut send_task => {
                        debug!(user_id = %self.user_id, "Writer finished");
                        break;
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.on_frame(text.as_str());
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        // ping/pong are answered by the transport, binary is not part of the protocol
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            self.on_error(e);
                            break;
                        }
                    }
                }
            }

            send_task.abort();
            self.close();
        }
    }

    /// Forward queued frames to the socket
    fn writer_loop(
        receiver: mpsc::Receiver<String>,
        mut sink: SplitSink<WebSocket, Message>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut frames = ReceiverStream::new(receiver);
            while let Some(text) = frames.next().await {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "Socket send failed");
                    break;
                }
            }
        })
    }
}
