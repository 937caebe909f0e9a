//! Live connection handles and outbound fan-out
//!
//! Each transport session is represented by a [`Connection`] holding the
//! sending half of that session's outbound queue. The gateway owns every
//! handle through a [`ConnectionTable`]; transport tasks only ever see the
//! receiving half.
//!
//! Engine code never touches connections directly. It encodes events into
//! [`Frame`]s and hands them to an [`Outbox`], which is what lets the poll
//! engine be tested with a recording outbox instead of real sockets.

use crate::error::ServerError;
use log::{debug, info};
use shared::ServerEvent;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Opaque handle of one live transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One encoded outbound event. Cloning shares the encoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn encode(event: &ServerEvent) -> Result<Self, ServerError> {
        Ok(Frame(Arc::from(event.encode()?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Instructions for a connection's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(Frame),
    /// Close the socket; the writer stops after sending the close frame.
    Close,
}

/// Where encoded events go once an operation decides to emit them.
pub trait Outbox {
    /// Queues the frame for every live connection.
    fn broadcast(&mut self, frame: &Frame);

    /// Queues the frame for a single connection. Unknown or closed
    /// connections are skipped.
    fn send_to(&mut self, id: ConnectionId, frame: &Frame);

    /// Forcibly closes a connection.
    fn terminate(&mut self, id: ConnectionId) -> Result<(), ServerError>;
}

/// A live transport session as seen by the gateway.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Peer address, when the transport knows it
    pub addr: Option<SocketAddr>,
    pub connected_at: Instant,
    pub sender: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Connection {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
        }
    }

    // Queue a frame; false once the writer side has gone away
    pub fn send(&self, frame: &Frame) -> bool {
        self.sender.send(Outbound::Frame(frame.clone())).is_ok()
    }

    pub fn close(&self) -> Result<(), ServerError> {
        self.sender
            .send(Outbound::Close)
            .map_err(|_| ServerError::ConnectionClosed(self.id))
    }
}

/// All connections currently registered with the gateway.
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
    max_connections: usize,
}

impl ConnectionTable {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            max_connections,
        }
    }

    /// Registers a connection.
    ///
    /// Hands the connection back when the table is already at capacity so the
    /// caller can close it.
    pub fn insert(&mut self, connection: Connection) -> Result<(), Connection> {
        if self.connections.len() >= self.max_connections {
            return Err(connection);
        }

        match connection.addr {
            Some(addr) => info!("Connection {} opened from {}", connection.id, addr),
            None => info!("Connection {} opened", connection.id),
        }
        self.connections.insert(connection.id, connection);
        Ok(())
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let removed = self.connections.remove(&id);
        if let Some(connection) = &removed {
            info!(
                "Connection {} closed after {:.1}s",
                id,
                connection.connected_at.elapsed().as_secs_f32()
            );
        }
        removed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl Outbox for ConnectionTable {
    fn broadcast(&mut self, frame: &Frame) {
        for connection in self.connections.values() {
            if !connection.send(frame) {
                debug!("Dropped frame for closed connection {}", connection.id);
            }
        }
    }

    fn send_to(&mut self, id: ConnectionId, frame: &Frame) {
        match self.connections.get(&id) {
            Some(connection) => {
                if !connection.send(frame) {
                    debug!("Dropped frame for closed connection {}", id);
                }
            }
            None => debug!("No connection {} to send to", id),
        }
    }

    fn terminate(&mut self, id: ConnectionId) -> Result<(), ServerError> {
        match self.connections.get(&id) {
            Some(connection) => connection.close(),
            None => Err(ServerError::ConnectionClosed(id)),
        }
    }
}

/// Outbox that records everything, for exercising engine code without sockets.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingOutbox {
    pub broadcasts: Vec<ServerEvent>,
    pub targeted: Vec<(ConnectionId, ServerEvent)>,
    pub terminated: Vec<ConnectionId>,
}

#[cfg(test)]
impl Outbox for RecordingOutbox {
    fn broadcast(&mut self, frame: &Frame) {
        self.broadcasts
            .push(ServerEvent::decode(frame.as_str()).expect("valid frame"));
    }

    fn send_to(&mut self, id: ConnectionId, frame: &Frame) {
        self.targeted
            .push((id, ServerEvent::decode(frame.as_str()).expect("valid frame")));
    }

    fn terminate(&mut self, id: ConnectionId) -> Result<(), ServerError> {
        self.terminated.push(id);
        Ok(())
    }
}
