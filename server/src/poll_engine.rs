//! Poll creation and vote collection
//!
//! The engine turns coerced client requests into polls and votes, and emits
//! the resulting broadcasts through an [`Outbox`]:
//! - `pollCreated` once per poll, correctness flags included
//! - `pollResults` after every answer submission, including duplicates
//!
//! Each identity's first valid vote on a poll is counted exactly once. Later
//! submissions from the same identity leave the counts alone but still
//! rebroadcast the tally so the submitter's screen settles.
//!
//! Polls never close. The timer travels with the poll as metadata for
//! clients; the engine does not count it down.

use crate::connection::{Frame, Outbox};
use crate::error::{Ignored, Rejection};
use crate::payload::{AnswerRequest, CreatePollRequest};
use crate::poll::{Poll, PollOption, VoteOutcome};
use crate::poll_store::PollStore;
use crate::utils::truncate_chars;
use log::{debug, info};
use shared::{DisplayId, ServerEvent, DEFAULT_OPTION_TEXT, DEFAULT_TIMER_SECS, MAX_TEXT_LEN};
use serde_json::Number;
use uuid::Uuid;

/// Bounds applied to incoming poll definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollLimits {
    /// Longest question or option text kept, in characters
    pub max_text_len: usize,
    /// Timer given to polls created without a usable one
    pub default_timer: u32,
}

impl Default for PollLimits {
    fn default() -> Self {
        Self {
            max_text_len: MAX_TEXT_LEN,
            default_timer: DEFAULT_TIMER_SECS,
        }
    }
}

pub struct PollEngine {
    store: PollStore,
    limits: PollLimits,
}

impl PollEngine {
    pub fn new(limits: PollLimits) -> Self {
        Self {
            store: PollStore::new(),
            limits,
        }
    }

    pub fn store(&self) -> &PollStore {
        &self.store
    }

    pub fn limits(&self) -> PollLimits {
        self.limits
    }

    /// Creates a poll and announces it to every connection.
    ///
    /// The announcement is encoded before the poll is stored, so a failure at
    /// any step leaves neither a stored poll nor a broadcast behind.
    pub fn create_poll(
        &mut self,
        request: CreatePollRequest,
        outbox: &mut impl Outbox,
    ) -> Result<Uuid, Rejection> {
        let max_len = self.limits.max_text_len;

        let options: Vec<PollOption> = request
            .options
            .into_iter()
            .enumerate()
            .map(|(index, draft)| PollOption {
                id: Uuid::new_v4(),
                display_id: draft
                    .display_id
                    .unwrap_or_else(|| DisplayId::position(index)),
                text: truncate_chars(
                    draft.text.as_deref().unwrap_or(DEFAULT_OPTION_TEXT),
                    max_len,
                ),
                correct: draft.correct,
                votes: 0,
            })
            .collect();

        let poll = Poll::new(
            Uuid::new_v4(),
            request.teacher_username,
            truncate_chars(&request.question, max_len),
            request
                .timer
                .unwrap_or_else(|| Number::from(self.limits.default_timer)),
            options,
        );
        let poll_id = poll.id;

        let frame = Frame::encode(&ServerEvent::PollCreated(poll.live_view()))?;
        self.store.insert(poll)?;
        outbox.broadcast(&frame);

        Ok(poll_id)
    }

    /// Records an answer and broadcasts the tally.
    pub fn submit_answer(
        &mut self,
        request: AnswerRequest,
        outbox: &mut impl Outbox,
    ) -> Result<VoteOutcome, Rejection> {
        if request.username.is_empty() {
            return Err(Ignored::MissingField("username").into());
        }
        if request.poll_id.is_empty() {
            return Err(Ignored::MissingField("pollId").into());
        }
        if request.option.is_empty() {
            return Err(Ignored::MissingField("option").into());
        }

        // Only the exact id text handed out at creation matches
        let poll = Uuid::parse_str(&request.poll_id)
            .ok()
            .filter(|id| id.to_string() == request.poll_id)
            .and_then(|id| self.store.get_mut(&id))
            .ok_or_else(|| Ignored::UnknownPoll(request.poll_id.clone()))?;

        let outcome = poll.record_vote(&request.username, &request.option)?;
        match outcome {
            VoteOutcome::Counted => info!(
                "{} voted {:?} on poll {}",
                request.username, request.option, poll.id
            ),
            VoteOutcome::AlreadyVoted => debug!(
                "{} already voted on poll {}, rebroadcasting tally",
                request.username, poll.id
            ),
        }

        let frame = Frame::encode(&ServerEvent::PollResults(poll.tally()))?;
        outbox.broadcast(&frame);

        Ok(outcome)
    }
}

impl Default for PollEngine {
    fn default() -> Self {
        Self::new(PollLimits::default())
    }
}
