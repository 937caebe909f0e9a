//! In-memory storage for every poll created during the process lifetime
//!
//! Polls are indexed two ways:
//! - by id, for vote submission
//! - by creating teacher, in creation order, for the history endpoint
//!
//! Nothing is ever deleted and nothing survives a restart.

use crate::error::ServerError;
use crate::poll::Poll;
use log::info;
use shared::PollSummary;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PollStore {
    polls: HashMap<Uuid, Poll>,
    /// Poll ids per teacher, oldest first
    by_teacher: HashMap<String, Vec<Uuid>>,
}

impl PollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a poll and appends it to its teacher's history.
    pub fn insert(&mut self, poll: Poll) -> Result<(), ServerError> {
        if self.polls.contains_key(&poll.id) {
            return Err(ServerError::DuplicatePoll(poll.id));
        }

        info!(
            "Stored poll {} by {:?} with {} options",
            poll.id,
            poll.teacher_username,
            poll.options.len()
        );
        self.by_teacher
            .entry(poll.teacher_username.clone())
            .or_default()
            .push(poll.id);
        self.polls.insert(poll.id, poll);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<&Poll> {
        self.polls.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Poll> {
        self.polls.get_mut(id)
    }

    /// A teacher's polls in creation order, without correctness flags.
    pub fn list_by_teacher(&self, teacher: &str) -> Vec<PollSummary> {
        self.by_teacher
            .get(teacher)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.polls.get(id))
                    .map(Poll::summary)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.polls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polls.is_empty()
    }
}
