//! Answer aggregation for the current question
//!
//! The aggregator records at most one submission per player for the question
//! that is open and reports how much of the roster captured at question start
//! has answered. The host uses that coverage to reveal early.
//!
//! Submissions can overtake the `QuestionShow` they answer on the channel.
//! Those naming a question that has not opened yet are held back and
//! replayed when it opens.

use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
};

use itertools::Itertools;
use tracing::trace;

use crate::{constants, message::AnswerCounts, roster::Id};

/// A recorded answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    /// The chosen option
    pub answer_index: usize,
    /// Milliseconds between the question appearing and the answer
    pub response_time_ms: u64,
}

/// What happened to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The answer was recorded
    Recorded,
    /// The player already answered this question
    Duplicate,
    /// The submission names a question other than the open one
    WrongQuestion,
    /// The submission names a question that has not opened yet and is held
    Held,
    /// The chosen option does not exist on this question
    OutOfRange,
    /// Submissions for this question are closed
    Closed,
}

/// Submissions for a single question
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregator {
    /// The question currently collecting answers
    question_index: Option<usize>,
    /// Number of options on that question
    option_count: usize,
    /// Players whose answers are required for full coverage
    known: HashSet<Id>,
    /// One answer per player
    submissions: HashMap<Id, Submission>,
    /// Players in the order their answers arrived
    arrival: Vec<Id>,
    /// Whether submissions are accepted
    open: bool,
    /// Submissions for later questions, keyed by question index
    early: Vec<(usize, Id, Submission)>,
}

impl Aggregator {
    /// Opens a question for submissions
    ///
    /// `known` is the roster captured now; players joining later are not
    /// waited for. Held submissions for this question are recorded right
    /// away, those for earlier questions are dropped.
    pub fn begin(
        &mut self,
        question_index: usize,
        option_count: usize,
        known: impl IntoIterator<Item = Id>,
    ) {
        let early = std::mem::take(&mut self.early);
        *self = Self {
            question_index: Some(question_index),
            option_count: option_count.min(constants::question::MAX_ANSWER_COUNT),
            known: known.into_iter().collect(),
            submissions: HashMap::new(),
            arrival: Vec::new(),
            open: true,
            early: Vec::new(),
        };

        for (index, player, submission) in early {
            match index.cmp(&question_index) {
                Ordering::Less => {}
                Ordering::Equal => {
                    let outcome = self.submit(
                        player,
                        index,
                        submission.answer_index,
                        submission.response_time_ms,
                    );
                    trace!(%player, question_index, ?outcome, "replaying held submission");
                }
                Ordering::Greater => self.early.push((index, player, submission)),
            }
        }
    }

    /// Keeps a submission for a question that has not opened yet
    fn hold(
        &mut self,
        player: Id,
        question_index: usize,
        answer_index: usize,
        response_time_ms: u64,
    ) -> SubmitOutcome {
        if self
            .early
            .iter()
            .any(|(index, id, _)| *index == question_index && *id == player)
        {
            return SubmitOutcome::Duplicate;
        }
        if self.early.len() >= constants::session::MAX_PLAYER_COUNT {
            trace!(%player, question_index, "too many held submissions");
            return SubmitOutcome::WrongQuestion;
        }
        trace!(%player, question_index, "holding submission for a question not shown yet");
        self.early.push((
            question_index,
            player,
            Submission {
                answer_index,
                response_time_ms,
            },
        ));
        SubmitOutcome::Held
    }

    /// Records a submission
    ///
    /// Calling this again for the same player and question leaves the state
    /// untouched.
    pub fn submit(
        &mut self,
        player: Id,
        question_index: usize,
        answer_index: usize,
        response_time_ms: u64,
    ) -> SubmitOutcome {
        if self
            .question_index
            .is_none_or(|current| question_index > current)
        {
            return self.hold(player, question_index, answer_index, response_time_ms);
        }
        if self.question_index != Some(question_index) {
            trace!(%player, question_index, "submission for another question");
            return SubmitOutcome::WrongQuestion;
        }
        if !self.open {
            trace!(%player, question_index, "submission after close");
            return SubmitOutcome::Closed;
        }
        if self.submissions.contains_key(&player) {
            trace!(%player, question_index, "duplicate submission");
            return SubmitOutcome::Duplicate;
        }
        if answer_index >= self.option_count {
            return SubmitOutcome::OutOfRange;
        }

        self.submissions.insert(
            player,
            Submission {
                answer_index,
                response_time_ms,
            },
        );
        self.arrival.push(player);
        SubmitOutcome::Recorded
    }

    /// Fraction of the captured roster that has answered
    ///
    /// With nobody to wait for the coverage is 1.0.
    pub fn coverage(&self) -> f64 {
        if self.known.is_empty() {
            return 1.0;
        }
        self.answered_known() as f64 / self.known.len() as f64
    }

    /// Whether every captured player has answered
    pub fn is_complete(&self) -> bool {
        self.answered_known() == self.known.len()
    }

    fn answered_known(&self) -> usize {
        self.known
            .iter()
            .filter(|id| self.submissions.contains_key(id))
            .count()
    }

    /// Stops waiting for a player who left
    pub fn remove_known(&mut self, id: Id) {
        self.known.remove(&id);
    }

    /// Stops accepting submissions
    pub fn close(&mut self) {
        self.open = false;
    }

    /// Forgets everything, including the open question and held submissions
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Whether submissions are accepted
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The question collecting answers
    pub fn question_index(&self) -> Option<usize> {
        self.question_index
    }

    /// Number of players waited for
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Number of recorded answers, including players outside the captured roster
    pub fn answer_count(&self) -> usize {
        self.submissions.len()
    }

    /// Ids of every player who answered
    pub fn answered_ids(&self) -> HashSet<Id> {
        self.submissions.keys().copied().collect()
    }

    /// A player's recorded answer
    pub fn submission(&self, id: Id) -> Option<Submission> {
        self.submissions.get(&id).copied()
    }

    /// How many players picked each option
    pub fn answer_counts(&self) -> AnswerCounts {
        let mut counts = AnswerCounts::default();
        for submission in self.submissions.values() {
            if let Some(count) = counts.get_mut(submission.answer_index) {
                *count += 1;
            }
        }
        counts
    }

    /// Players who picked the given option, in arrival order
    pub fn players_choosing(&self, answer_index: usize) -> Vec<Id> {
        self.arrival
            .iter()
            .copied()
            .filter(|id| {
                self.submissions
                    .get(id)
                    .is_some_and(|s| s.answer_index == answer_index)
            })
            .collect_vec()
    }
}
