use shared::{DisplayId, LiveOption, OptionSummary, PollCreated, PollSummary, Tally};
use serde_json::Number;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Ignored;

#[derive(Debug, Clone, PartialEq)]
pub struct PollOption {
    pub id: Uuid,
    pub display_id: DisplayId,
    pub text: String,
    pub correct: bool,
    pub votes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// First valid vote of this identity; counts moved
    Counted,
    /// Identity had already voted; counts untouched
    AlreadyVoted,
}

#[derive(Debug, Clone)]
pub struct Poll {
    pub id: Uuid,
    pub question: String,
    /// Advisory only, nothing counts it down
    pub timer: Number,
    pub teacher_username: String,
    pub options: Vec<PollOption>,
    votes_by_option_text: Tally,
    voters: HashSet<String>,
}

impl Poll {
    pub fn new(
        id: Uuid,
        teacher_username: String,
        question: String,
        timer: Number,
        options: Vec<PollOption>,
    ) -> Self {
        // Options sharing a text share a bucket
        let votes_by_option_text = options
            .iter()
            .map(|option| (option.text.clone(), 0))
            .collect();

        Self {
            id,
            question,
            timer,
            teacher_username,
            options,
            votes_by_option_text,
            voters: HashSet::new(),
        }
    }

    /// Records a vote by option text.
    ///
    /// The voter set, the tally bucket and the option counter move together;
    /// when the identity already voted or the text matches no option nothing
    /// moves at all.
    pub fn record_vote(&mut self, username: &str, option_text: &str) -> Result<VoteOutcome, Ignored> {
        if self.voters.contains(username) {
            return Ok(VoteOutcome::AlreadyVoted);
        }

        let option = self
            .options
            .iter_mut()
            .find(|option| option.text == option_text)
            .ok_or_else(|| Ignored::UnknownOption(option_text.to_string()))?;

        self.voters.insert(username.to_string());
        *self
            .votes_by_option_text
            .entry(option_text.to_string())
            .or_insert(0) += 1;
        option.votes += 1;

        Ok(VoteOutcome::Counted)
    }

    pub fn has_voted(&self, username: &str) -> bool {
        self.voters.contains(username)
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    /// Copy of the current tally
    pub fn tally(&self) -> Tally {
        self.votes_by_option_text.clone()
    }

    /// Projection broadcast when the poll is created, correctness included.
    pub fn live_view(&self) -> PollCreated {
        PollCreated {
            id: self.id.to_string(),
            question: self.question.clone(),
            options: self
                .options
                .iter()
                .map(|option| LiveOption {
                    id: option.display_id.clone(),
                    text: option.text.clone(),
                    correct: option.correct,
                })
                .collect(),
            timer: self.timer.clone(),
        }
    }

    /// Projection served to history readers, correctness left out.
    pub fn summary(&self) -> PollSummary {
        PollSummary {
            id: self.id.to_string(),
            question: self.question.clone(),
            options: self
                .options
                .iter()
                .map(|option| OptionSummary {
                    id: option.id.to_string(),
                    text: option.text.clone(),
                    votes: option.votes,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_poll(teacher: &str, texts: &[&str]) -> Poll {
    let options = texts
        .iter()
        .enumerate()
        .map(|(index, text)| PollOption {
            id: Uuid::new_v4(),
            display_id: DisplayId::position(index),
            text: text.to_string(),
            correct: index == 0,
            votes: 0,
        })
        .collect();
    Poll::new(
        Uuid::new_v4(),
        teacher.to_string(),
        "question".to_string(),
        Number::from(60),
        options,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_seeded_with_zeroes() {
        let poll = test_poll("t1", &["3", "4"]);
        let tally = poll.tally();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally["3"], 0);
        assert_eq!(tally["4"], 0);
    }

    #[test]
    fn test_first_vote_counts_everywhere() {
        let mut poll = test_poll("t1", &["3", "4"]);

        assert_eq!(poll.record_vote("u1", "4"), Ok(VoteOutcome::Counted));
        assert_eq!(poll.tally()["4"], 1);
        assert_eq!(poll.options[1].votes, 1);
        assert!(poll.has_voted("u1"));
    }

    #[test]
    fn test_duplicate_vote_moves_nothing() {
        let mut poll = test_poll("t1", &["3", "4"]);
        poll.record_vote("u1", "4").unwrap();

        assert_eq!(poll.record_vote("u1", "3"), Ok(VoteOutcome::AlreadyVoted));
        assert_eq!(poll.tally()["3"], 0);
        assert_eq!(poll.tally()["4"], 1);
        assert_eq!(poll.voter_count(), 1);
    }

    #[test]
    fn test_duplicate_checked_before_option() {
        let mut poll = test_poll("t1", &["3", "4"]);
        poll.record_vote("u1", "4").unwrap();

        assert_eq!(poll.record_vote("u1", "nope"), Ok(VoteOutcome::AlreadyVoted));
    }

    #[test]
    fn test_unknown_option_moves_nothing() {
        let mut poll = test_poll("t1", &["3", "4"]);

        assert_eq!(
            poll.record_vote("u1", "5"),
            Err(Ignored::UnknownOption("5".to_string()))
        );
        assert!(!poll.has_voted("u1"));
        assert_eq!(poll.tally().values().sum::<u64>(), 0);
    }

    #[test]
    fn test_shared_text_collapses_into_one_bucket() {
        let mut poll = test_poll("t1", &["same", "same"]);
        assert_eq!(poll.tally().len(), 1);

        poll.record_vote("u1", "same").unwrap();
        poll.record_vote("u2", "same").unwrap();

        assert_eq!(poll.tally()["same"], 2);
        // Exact-match resolution always lands on the first option
        assert_eq!(poll.options[0].votes, 2);
        assert_eq!(poll.options[1].votes, 0);
    }

    #[test]
    fn test_tally_sum_equals_voters() {
        let mut poll = test_poll("t1", &["a", "b", "c"]);
        let votes = [
            ("u1", "a"),
            ("u2", "b"),
            ("u1", "b"),
            ("u3", "x"),
            ("u3", "c"),
            ("u2", "c"),
        ];
        for (user, text) in votes {
            let _ = poll.record_vote(user, text);
        }

        assert_eq!(poll.tally().values().sum::<u64>(), poll.voter_count() as u64);
        assert_eq!(poll.voter_count(), 3);
    }

    #[test]
    fn test_projections() {
        let mut poll = test_poll("t1", &["3", "4"]);
        poll.record_vote("u1", "3").unwrap();

        let live = poll.live_view();
        assert_eq!(live.id, poll.id.to_string());
        assert_eq!(
            live.options.iter().map(|o| o.correct).collect::<Vec<_>>(),
            vec![true, false]
        );

        let summary = poll.summary();
        assert_eq!(summary.options[0].id, poll.options[0].id.to_string());
        assert_eq!(summary.options[0].votes, 1);
        assert_eq!(summary.options[1].votes, 0);
    }
}
