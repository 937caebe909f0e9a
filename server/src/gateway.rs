//! Session gateway: the single event loop behind every connection
//!
//! Transport tasks never touch session state. They forward [`GatewayEvent`]s
//! through a [`GatewayHandle`] and the gateway task applies them one at a
//! time, each handler running to completion before the next event is read.
//! That ordering is what makes attach-then-publish and vote-then-broadcast
//! race-free without any locking.
//!
//! Handlers never fail outward. Invalid input is dropped, internal faults are
//! logged, and in both cases clients simply observe that nothing happened.

use crate::config::ServerConfig;
use crate::connection::{Connection, ConnectionId, ConnectionTable, Frame, Outbound, Outbox};
use crate::error::{Rejection, ServerError};
use crate::payload::{self, AnswerRequest, CreatePollRequest};
use crate::poll_engine::{PollEngine, PollLimits};
use crate::presence::PresencePublisher;
use crate::registry::IdentityRegistry;
use log::{debug, error, info, warn};
use serde_json::Value;
use shared::{ClientEvent, PollSummary, ServerEvent};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Messages sent from transport tasks to the gateway loop
#[derive(Debug)]
pub enum GatewayEvent {
    Connected {
        id: ConnectionId,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<Outbound>,
    },
    Inbound {
        id: ConnectionId,
        event: ClientEvent,
    },
    Disconnected {
        id: ConnectionId,
    },
    PollHistory {
        teacher: String,
        reply: oneshot::Sender<Vec<PollSummary>>,
    },
}

/// Cloneable entry point into a running gateway.
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::UnboundedSender<GatewayEvent>,
    next_id: Arc<AtomicU64>,
}

impl GatewayHandle {
    /// Registers a new connection and returns its id.
    pub fn connect(
        &self,
        addr: Option<SocketAddr>,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<ConnectionId, ServerError> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.send(GatewayEvent::Connected { id, addr, sender })?;
        Ok(id)
    }

    pub fn inbound(&self, id: ConnectionId, event: ClientEvent) -> Result<(), ServerError> {
        self.send(GatewayEvent::Inbound { id, event })
    }

    pub fn disconnect(&self, id: ConnectionId) -> Result<(), ServerError> {
        self.send(GatewayEvent::Disconnected { id })
    }

    /// A teacher's poll history, answered by the gateway loop.
    pub async fn poll_history(&self, teacher: &str) -> Result<Vec<PollSummary>, ServerError> {
        let (reply, response) = oneshot::channel();
        self.send(GatewayEvent::PollHistory {
            teacher: teacher.to_string(),
            reply,
        })?;
        response.await.map_err(|_| ServerError::GatewayUnavailable)
    }

    fn send(&self, event: GatewayEvent) -> Result<(), ServerError> {
        self.tx
            .send(event)
            .map_err(|_| ServerError::GatewayUnavailable)
    }
}

/// Composition root owning all session state.
pub struct SessionGateway {
    connections: ConnectionTable,
    registry: IdentityRegistry,
    presence: PresencePublisher,
    polls: PollEngine,
}

impl SessionGateway {
    pub fn new(max_connections: usize, limits: PollLimits) -> Self {
        Self {
            connections: ConnectionTable::new(max_connections),
            registry: IdentityRegistry::new(),
            presence: PresencePublisher::new(),
            polls: PollEngine::new(limits),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_connections, config.poll_limits())
    }

    /// Creates the channel feeding this gateway.
    pub fn channel() -> (GatewayHandle, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = GatewayHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (handle, rx)
    }

    /// Spawns the gateway loop on the current runtime.
    pub fn spawn(self) -> (GatewayHandle, JoinHandle<()>) {
        let (handle, rx) = Self::channel();
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Applies events until every handle has been dropped.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GatewayEvent>) {
        info!("Session gateway started");
        while let Some(event) = rx.recv().await {
            self.handle(event);
        }
        info!(
            "Session gateway stopped with {} polls stored",
            self.polls.store().len()
        );
    }

    /// Applies a single event to completion.
    pub fn handle(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected { id, addr, sender } => {
                self.on_connected(Connection::new(id, addr, sender));
            }
            GatewayEvent::Inbound { id, event } => {
                if !self.connections.contains(id) {
                    debug!("Dropping {} from unregistered connection {}", event.name(), id);
                    return;
                }
                self.on_inbound(id, event);
            }
            GatewayEvent::Disconnected { id } => {
                self.on_disconnected(id);
            }
            GatewayEvent::PollHistory { teacher, reply } => {
                let history = self.polls.store().list_by_teacher(&teacher);
                if reply.send(history).is_err() {
                    debug!("History reader for {:?} went away", teacher);
                }
            }
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn polls(&self) -> &PollEngine {
        &self.polls
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    fn on_connected(&mut self, connection: Connection) {
        if let Err(rejected) = self.connections.insert(connection) {
            warn!(
                "Refusing connection {}: limit of {} reached",
                rejected.id,
                self.connections.len()
            );
            let _ = rejected.close();
        }
    }

    fn on_inbound(&mut self, id: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinChat(payload) => self.join(id, &payload),
            ClientEvent::ChatMessage(message) => self.relay_chat(message),
            ClientEvent::KickOut(payload) => self.kick(id, &payload),
            ClientEvent::CreatePoll(payload) => self.create_poll(&payload),
            ClientEvent::SubmitAnswer(payload) => self.submit_answer(&payload),
        }
    }

    fn on_disconnected(&mut self, id: ConnectionId) {
        if self.connections.remove(id).is_none() {
            debug!("Disconnect for unknown connection {}", id);
            return;
        }
        if let Some(identity) = self.registry.detach(id) {
            debug!("Connection {} of {} detached", id, identity);
        }
        self.publish_presence();
    }

    fn join(&mut self, id: ConnectionId, payload: &Value) {
        let Some(username) = payload::join_username(payload) else {
            debug!("joinChat without username from connection {}", id);
            return;
        };
        if self.registry.attach(id, &username) {
            self.publish_presence();
        }
    }

    fn relay_chat(&mut self, message: Value) {
        match Frame::encode(&ServerEvent::ChatMessage(message)) {
            Ok(frame) => self.connections.broadcast(&frame),
            Err(e) => error!("Error relaying chat message: {}", e),
        }
    }

    fn kick(&mut self, from: ConnectionId, payload: &Value) {
        let Some(target) = payload::kick_target(payload) else {
            debug!("kickOut without username from connection {}", from);
            return;
        };
        let targets = self.registry.connections_for(&target);
        if targets.is_empty() {
            debug!("kickOut for {:?} who has no connections", target);
            return;
        }

        let frame = match Frame::encode(&ServerEvent::KickedOut) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Error encoding kick notice: {}", e);
                return;
            }
        };

        info!(
            "Kicking {} ({} connections) at the request of connection {}",
            target,
            targets.len(),
            from
        );
        for id in targets {
            self.connections.send_to(id, &frame);
            if let Err(e) = self.connections.terminate(id) {
                debug!("Ignoring failed termination of {}: {}", id, e);
            }
        }
    }

    fn create_poll(&mut self, payload: &Value) {
        let result = CreatePollRequest::from_payload(payload)
            .map_err(Rejection::from)
            .and_then(|request| self.polls.create_poll(request, &mut self.connections));
        match result {
            Ok(poll_id) => debug!("Announced poll {}", poll_id),
            Err(rejection) => log_rejection("createPoll", rejection),
        }
    }

    fn submit_answer(&mut self, payload: &Value) {
        let request = AnswerRequest::from_payload(payload);
        if let Err(rejection) = self.polls.submit_answer(request, &mut self.connections) {
            log_rejection("submitAnswer", rejection);
        }
    }

    fn publish_presence(&mut self) {
        if let Err(e) = self.presence.publish(&self.registry, &mut self.connections) {
            error!("Error publishing presence: {}", e);
        }
    }
}

fn log_rejection(operation: &str, rejection: Rejection) {
    match rejection {
        Rejection::Ignored(reason) => debug!("{} ignored: {}", operation, reason),
        Rejection::Fault(e) => error!("Error handling {}: {}", operation, e),
    }
}
