//! Point-to-point message routing

use tracing::{debug, error, warn};

use crate::error::Error;
use crate::message::{is_blank, InboundMessage};
use crate::registry::Registry;

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the recipient's connection
    Delivered { to_user_id: String },
    /// Blank or unparseable payload, dropped silently
    Ignored,
    /// Recipient missing, blank, or not connected to this node
    RecipientUnreachable(String),
    /// Recipient is registered but the send failed
    DeliveryFailed { to_user_id: String, reason: String },
}

/// Routes inbound frames to their recipients through the registry
#[derive(Clone)]
pub struct Router {
    registry: Registry,
}

impl Router {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    /// Route one raw frame sent by `from_user_id`.
    ///
    /// Lookup and send are separate steps: a recipient that disconnects in
    /// between shows up as `DeliveryFailed`. A failed send never unregisters
    /// the recipient.
    pub fn route(&self, from_user_id: &str, raw: &str) -> RouteOutcome {
        let message = match InboundMessage::parse(raw) {
            Ok(message) => message.with_sender(from_user_id),
            Err(e) => {
                debug!(from_user_id, error = %e, "Dropping unparseable frame");
                return RouteOutcome::Ignored;
            }
        };

        let to_user_id = message.to_user_id().unwrap_or_default();
        if is_blank(&to_user_id) {
            warn!(from_user_id, "Message has no recipient");
            return RouteOutcome::RecipientUnreachable(to_user_id);
        }

        let Some(connection) = self.registry.lookup(&to_user_id) else {
            // Not on this node. No store-and-forward here.
            warn!(from_user_id, to_user_id = %to_user_id, "Recipient not on this server");
            return RouteOutcome::RecipientUnreachable(to_user_id);
        };

        match connection.send(message.to_wire()) {
            Ok(()) => {
                debug!(from_user_id, to_user_id = %to_user_id, "Message delivered");
                RouteOutcome::Delivered { to_user_id }
            }
            Err(e) => {
                error!(from_user_id, to_user_id = %to_user_id, error = %e, "Delivery failed");
                let reason = match e {
                    Error::DeliveryFailed { reason, .. } => reason,
                    other => other.to_string(),
                };
                RouteOutcome::DeliveryFailed { to_user_id, reason }
            }
        }
    }
}
