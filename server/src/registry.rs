//! Identity tracking for connected participants
//!
//! This module maps live connections to the usernames they joined with:
//! - A connection belongs to at most one identity at a time
//! - One identity may hold several connections (multiple tabs or devices)
//! - An identity disappears as soon as its last connection detaches
//!
//! Usernames are whatever the client asserted when joining; the registry
//! performs no authentication.

use crate::connection::ConnectionId;
use log::{debug, info};
use std::collections::{HashMap, HashSet};

/// Bidirectional connection <-> identity mapping.
///
/// Both directions are kept in step by every mutating call, so looking up a
/// connection's identity and an identity's connections always agree.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// Owning identity of each attached connection
    identities: HashMap<ConnectionId, String>,
    /// Attached connections of each identity, never empty
    connections: HashMap<String, HashSet<ConnectionId>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a connection with an identity.
    ///
    /// Returns false and changes nothing when the identity is empty. A
    /// connection that already belonged to another identity is moved.
    pub fn attach(&mut self, connection: ConnectionId, identity: &str) -> bool {
        if identity.is_empty() {
            return false;
        }

        if let Some(previous) = self.identities.get(&connection) {
            if previous != identity {
                debug!(
                    "Connection {} switching identity from {} to {}",
                    connection, previous, identity
                );
                self.detach(connection);
            }
        }

        self.identities.insert(connection, identity.to_string());
        let is_new = !self.connections.contains_key(identity);
        self.connections
            .entry(identity.to_string())
            .or_default()
            .insert(connection);

        if is_new {
            info!("{} joined on connection {}", identity, connection);
        } else {
            debug!("{} attached another connection {}", identity, connection);
        }
        true
    }

    /// Detaches a connection from its identity.
    ///
    /// Returns the identity it belonged to. Unknown connections are a no-op.
    pub fn detach(&mut self, connection: ConnectionId) -> Option<String> {
        let identity = self.identities.remove(&connection)?;

        if let Some(set) = self.connections.get_mut(&identity) {
            set.remove(&connection);
            if set.is_empty() {
                self.connections.remove(&identity);
                info!("{} left", identity);
            }
        }

        Some(identity)
    }

    /// Distinct identities holding at least one connection, sorted.
    pub fn list_identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self.connections.keys().cloned().collect();
        identities.sort();
        identities
    }

    /// Connections of an identity, empty when it is not present.
    pub fn connections_for(&self, identity: &str) -> Vec<ConnectionId> {
        let mut connections: Vec<ConnectionId> = self
            .connections
            .get(identity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        connections.sort();
        connections
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<&str> {
        self.identities.get(&connection).map(String::as_str)
    }

    /// Number of distinct identities
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
