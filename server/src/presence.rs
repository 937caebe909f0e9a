//! Presence broadcasting.
//!
//! Every membership change republishes the full participant list, without
//! batching.

use crate::connection::{Frame, Outbox};
use crate::error::ServerError;
use crate::registry::IdentityRegistry;
use log::debug;
use shared::ServerEvent;

#[derive(Debug, Default)]
pub struct PresencePublisher {
    published: u64,
}

impl PresencePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broadcasts the current participant list to every connection.
    pub fn publish(
        &mut self,
        registry: &IdentityRegistry,
        outbox: &mut impl Outbox,
    ) -> Result<(), ServerError> {
        let participants = registry.list_identities();
        let count = participants.len();
        let frame = Frame::encode(&ServerEvent::ParticipantsUpdate(participants))?;
        outbox.broadcast(&frame);

        self.published += 1;
        debug!("Presence update #{}: {} participants", self.published, count);
        Ok(())
    }

    /// Number of presence updates sent so far
    pub fn published(&self) -> u64 {
        self.published
    }
}
