//! # WS Relay
//!
//! Point-to-point message relay over WebSocket.
//!
//! Clients connect to `/{endpoint}/{user_id}` and send JSON frames carrying a
//! `toUserId` field. The relay stamps `fromUserId` with the sender's session
//! identity and forwards the frame to the recipient's live connection.
//! Server-side code delivers to a user directly through [`Registry::push`].
//!
//! ## Features
//!
//! - **One session per user**: reconnecting replaces the previous session
//! - **Exact online count**: kept in lock-step with the registry
//! - **Per-key locking**: unrelated users never contend on a global lock
//! - **Best effort**: offline recipients are reported, never queued
//! - **Built-in Server**: optional Axum server with push API and status page
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ws_relay::Relay;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Relay::builder()
//!         .port(8080)
//!         .endpoint("web-socket")
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Pushing from server-side code
//!
//! ```rust,ignore
//! use ws_relay::{Error, Registry, Relay};
//!
//! let registry = Registry::new();
//! let relay = Relay::builder().registry(registry.clone()).build()?;
//! tokio::spawn(relay.run());
//!
//! match registry.push("alice", "ping") {
//!     Ok(()) => {}
//!     Err(Error::RecipientUnreachable(user)) => tracing::info!(%user, "not online"),
//!     Err(e) => tracing::warn!(error = %e, "push failed"),
//! }
//! ```

mod connection;
mod error;
pub mod gateway;
pub mod message;
mod registry;
pub mod router;

#[cfg(feature = "server")]
pub mod handler;
#[cfg(feature = "server")]
mod server;

// Re-exports
pub use connection::{Connection, ConnectionMetadata};
pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayConfig, GatewayState};
pub use message::InboundMessage;
pub use registry::Registry;
pub use router::{RouteOutcome, Router};

#[cfg(feature = "server")]
pub use server::{Relay, RelayBuilder, DEFAULT_ENDPOINT};

// Re-export commonly used types from dependencies
pub use tokio_util::sync::CancellationToken;
