//! Registry of online users

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::message::is_blank;

/// Maps each online user to its current connection.
///
/// The online counter is only touched while the shard lock for the affected
/// key is held, so it always settles at the map's size.
#[derive(Clone, Default)]
pub struct Registry {
    /// user_id -> connection
    connections: Arc<DashMap<String, Connection>>,
    online: Arc<AtomicUsize>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to its user.
    ///
    /// A reconnect replaces the previous entry without changing the online
    /// count. The superseded connection is returned untouched; closing it is
    /// up to the caller.
    pub fn register(&self, connection: Connection) -> Option<Connection> {
        let user_id = connection.user_id.clone();
        let replaced = match self.connections.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => Some(entry.insert(connection)),
            Entry::Vacant(entry) => {
                let _guard = entry.insert(connection);
                self.online.fetch_add(1, Ordering::AcqRel);
                None
            }
        };
        info!(
            user_id = %user_id,
            reconnect = replaced.is_some(),
            online_count = self.online_count(),
            "User connected"
        );
        replaced
    }

    /// Remove whatever connection is registered for `user_id`.
    /// Returns false if nothing was registered.
    pub fn unregister(&self, user_id: &str) -> bool {
        let removed = match self.connections.entry(user_id.to_string()) {
            Entry::Occupied(entry) => {
                self.online.fetch_sub(1, Ordering::AcqRel);
                entry.remove();
                true
            }
            Entry::Vacant(_) => false,
        };
        if removed {
            info!(user_id, online_count = self.online_count(), "User disconnected");
        }
        removed
    }

    /// Remove the entry for `user_id` only if it still holds the given
    /// connection instance. A stale session closing after its user has
    /// reconnected leaves the newer entry in place.
    pub fn unregister_connection(&self, user_id: &str, connection_id: &str) -> bool {
        let removed = match self.connections.entry(user_id.to_string()) {
            Entry::Occupied(entry) if entry.get().id == connection_id => {
                self.online.fetch_sub(1, Ordering::AcqRel);
                entry.remove();
                true
            }
            _ => false,
        };
        if removed {
            info!(
                user_id,
                connection_id,
                online_count = self.online_count(),
                "User disconnected"
            );
        } else {
            debug!(user_id, connection_id, "Connection already superseded or removed");
        }
        removed
    }

    /// Current connection for `user_id`
    pub fn lookup(&self, user_id: &str) -> Option<Connection> {
        self.connections.get(user_id).map(|e| e.value().clone())
    }

    /// Number of distinct online users
    pub fn online_count(&self) -> usize {
        self.online.load(Ordering::Acquire)
    }

    /// Online users, sorted
    pub fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.connections.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Snapshot of all registered connections
    pub fn list_connections(&self) -> Vec<Connection> {
        self.connections.iter().map(|e| e.value().clone()).collect()
    }

    /// Server-initiated delivery of a raw text frame to one user
    pub fn push(&self, to_user_id: &str, message: &str) -> Result<()> {
        info!(to_user_id, message, "Pushing message");
        if is_blank(to_user_id) {
            warn!("Push rejected: blank user id");
            return Err(Error::RecipientUnreachable(to_user_id.to_string()));
        }
        match self.lookup(to_user_id) {
            Some(connection) => connection.send(message),
            None => {
                warn!(to_user_id, "Push target not online");
                Err(Error::RecipientUnreachable(to_user_id.to_string()))
            }
        }
    }

    /// Drop entries whose session ended without a close transition.
    /// Returns how many were removed.
    pub fn cleanup_dead_connections(&self) -> usize {
        let dead: Vec<(String, String)> = self
            .connections
            .iter()
            .filter(|e| !e.value().is_alive())
            .map(|e| (e.key().clone(), e.value().id.clone()))
            .collect();

        dead.into_iter()
            .filter(|(user_id, connection_id)| self.unregister_connection(user_id, connection_id))
            .count()
    }
}
