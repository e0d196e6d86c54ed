//! Per-client session state
//!
//! `SessionState` is the one mutable aggregate each client keeps about the
//! running session. It only changes through the transition methods below,
//! each of which guards on the phase it leaves, the same way on the host
//! (which drives the transitions) and on participants (which replay them from
//! broadcasts).

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
    leaderboard::LeaderboardEntry,
    message::AnswerCounts,
    question::{LoadError, Question},
    roster::Id,
};

/// Phase of the question lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Waiting for the host to start; settings can be edited
    #[default]
    Config,
    /// A question is visible and submissions are accepted
    Showing,
    /// The correct answer is visible and submissions are rejected
    Revealed,
    /// The ranking is visible
    Leaderboard,
    /// The session is over and can be reset
    Ended,
}

/// Errors surfaced to the view layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No usable question could be loaded, so the session cannot start
    #[error("cannot start: {0}")]
    CannotStart(LoadError),
    /// Loading failed but an earlier question set is still in use
    #[error("reusing the previous questions: {0}")]
    StaleQuestions(LoadError),
}

impl SessionError {
    /// Whether this error prevents starting the session
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::CannotStart(_))
    }
}

/// Everything a client knows about the running session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Current phase
    pub phase: Phase,
    /// Index of the question being shown or last shown
    pub current_question_index: usize,
    /// Copy of the question being shown or last shown
    pub current_question: Option<Question>,
    /// Seconds left on the visible countdown
    pub remaining_seconds: u64,
    /// Players who answered the current question
    pub answered_player_ids: HashSet<Id>,
    /// What this client answered on the current question
    pub local_answer_index: Option<usize>,
    /// The correct option, known only while revealed or on the leaderboard
    pub correct_answer_index: Option<usize>,
    /// How many players picked each option, as announced with the reveal
    pub answer_counts: AnswerCounts,
    /// Accumulated score per player
    pub per_player_score: HashMap<Id, u64>,
    /// Ranking rows carried by the last leaderboard
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Total number of ranked players, which may exceed the rows carried
    pub leaderboard_count: usize,
    /// Error for the view layer
    pub error: Option<SessionError>,
}

impl SessionState {
    /// Whether the session has started and not yet been reset
    pub fn in_progress(&self) -> bool {
        !matches!(self.phase, Phase::Config)
    }

    /// Whether a message about `question_index` refers to a question already left behind
    pub fn is_passed(&self, question_index: usize) -> bool {
        self.in_progress() && question_index < self.current_question_index
    }

    /// Whether this client may still answer
    pub fn accepts_answers(&self) -> bool {
        self.phase == Phase::Showing && self.local_answer_index.is_none()
    }

    /// Moves to a new question
    ///
    /// Allowed from `config`, `leaderboard`, or, when the host skipped ahead,
    /// from any earlier question. The index never moves backwards.
    ///
    /// # Returns
    ///
    /// `true` if the transition happened
    pub fn show(&mut self, question_index: usize, question: Question, remaining_seconds: u64) -> bool {
        let allowed = match self.phase {
            Phase::Config => true,
            Phase::Ended => false,
            Phase::Showing | Phase::Revealed | Phase::Leaderboard => {
                question_index > self.current_question_index
            }
        };
        if !allowed {
            return false;
        }

        debug!(question_index, "showing question");
        self.phase = Phase::Showing;
        self.current_question_index = question_index;
        self.current_question = Some(question);
        self.remaining_seconds = remaining_seconds;
        self.answered_player_ids.clear();
        self.local_answer_index = None;
        self.correct_answer_index = None;
        self.answer_counts = AnswerCounts::default();
        true
    }

    /// Reveals the correct answer of a question
    ///
    /// Normally this closes the question being shown. A reveal for a later
    /// question than the one known here (the client missed the question, or
    /// joined while it ran) moves the client forward to that question.
    ///
    /// # Returns
    ///
    /// `true` if the transition happened
    pub fn reveal(
        &mut self,
        question_index: usize,
        correct_answer_index: usize,
        answer_counts: AnswerCounts,
    ) -> bool {
        let allowed = match self.phase {
            Phase::Config => true,
            Phase::Showing => question_index >= self.current_question_index,
            Phase::Revealed | Phase::Leaderboard => question_index > self.current_question_index,
            Phase::Ended => false,
        };
        if !allowed {
            return false;
        }

        if self.phase != Phase::Showing || question_index != self.current_question_index {
            debug!(question_index, "catching up to a later reveal");
            self.current_question_index = question_index;
            self.current_question = None;
            self.answered_player_ids.clear();
            self.local_answer_index = None;
        }

        debug!(question_index, correct_answer_index, "revealing answer");
        self.phase = Phase::Revealed;
        self.correct_answer_index = Some(correct_answer_index);
        self.answer_counts = answer_counts;
        self.remaining_seconds = 0;
        true
    }

    /// Shows the ranking after the current question's reveal
    ///
    /// # Returns
    ///
    /// `true` if the transition happened
    pub fn show_leaderboard(
        &mut self,
        question_index: usize,
        entries: Vec<LeaderboardEntry>,
        exact_count: usize,
    ) -> bool {
        if self.phase != Phase::Revealed || question_index != self.current_question_index {
            return false;
        }

        debug!(question_index, "showing leaderboard");
        self.phase = Phase::Leaderboard;
        self.leaderboard = entries;
        self.leaderboard_count = exact_count;
        true
    }

    /// Ends the session with a final ranking
    ///
    /// A client still in `config` may end directly when it joined after the
    /// last question.
    ///
    /// # Returns
    ///
    /// `true` if the transition happened
    pub fn end(&mut self, entries: Vec<LeaderboardEntry>, exact_count: usize) -> bool {
        if self.phase == Phase::Ended {
            return false;
        }

        debug!("session ended");
        self.phase = Phase::Ended;
        self.correct_answer_index = None;
        self.remaining_seconds = 0;
        self.leaderboard = entries;
        self.leaderboard_count = exact_count;
        true
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::question::tests::sample_question;

    #[test]
    fn test_full_lifecycle() {
        let mut state = SessionState::default();
        assert_eq!(state.phase, Phase::Config);
        assert!(!state.in_progress());

        assert!(state.show(0, sample_question("a", 1), 30));
        assert!(state.accepts_answers());
        assert_eq!(state.correct_answer_index, None);

        assert!(state.reveal(0, 1, [0, 2, 0, 0]));
        assert_eq!(state.correct_answer_index, Some(1));
        assert_eq!(state.answer_counts, [0, 2, 0, 0]);
        assert!(!state.accepts_answers());

        assert!(state.show_leaderboard(0, Vec::new(), 0));
        assert_eq!(state.correct_answer_index, Some(1));

        assert!(state.show(1, sample_question("b", 0), 30));
        assert_eq!(state.correct_answer_index, None);
        assert_eq!(state.answer_counts, [0; 4]);
        assert!(state.reveal(1, 0, [1, 0, 0, 0]));

        assert!(state.end(Vec::new(), 0));
        assert!(!state.end(Vec::new(), 0));
        assert_eq!(state.phase, Phase::Ended);
        assert_eq!(state.correct_answer_index, None);
    }

    #[test]
    fn test_transitions_guard_on_phase() {
        let mut state = SessionState::default();
        assert!(!state.show_leaderboard(0, Vec::new(), 0));

        state.show(0, sample_question("a", 0), 30);
        assert!(!state.show_leaderboard(0, Vec::new(), 0));
        assert!(state.reveal(0, 0, [0; 4]));
        assert!(!state.reveal(0, 0, [0; 4]));
    }

    #[test]
    fn test_question_index_never_moves_backwards() {
        let mut state = SessionState::default();
        state.show(2, sample_question("c", 0), 30);

        assert!(!state.show(1, sample_question("b", 0), 30));
        assert!(!state.show(2, sample_question("c", 0), 30));
        assert_eq!(state.current_question_index, 2);
        assert!(state.is_passed(1));
        assert!(!state.is_passed(2));
    }

    #[test]
    fn test_reveal_for_other_question_is_ignored() {
        let mut state = SessionState::default();
        state.show(1, sample_question("b", 0), 30);
        assert!(!state.reveal(0, 0, [0; 4]));
        assert_eq!(state.phase, Phase::Showing);
    }

    #[test]
    fn test_reveal_for_later_question_catches_up() {
        let mut state = SessionState::default();
        state.show(0, sample_question("a", 0), 30);
        state.local_answer_index = Some(2);

        assert!(state.reveal(2, 3, [0; 4]));
        assert_eq!(state.current_question_index, 2);
        assert_eq!(state.current_question, None);
        assert_eq!(state.local_answer_index, None);
        assert_eq!(state.phase, Phase::Revealed);

        assert!(!state.reveal(2, 3, [0; 4]));
        assert!(state.reveal(3, 1, [0; 4]));
    }

    #[test]
    fn test_late_joiner_can_reveal_and_end_from_config() {
        let mut state = SessionState::default();
        assert!(state.reveal(4, 1, [0; 4]));
        assert_eq!(state.current_question_index, 4);

        let mut state = SessionState::default();
        assert!(state.end(Vec::new(), 0));
        assert_eq!(state.phase, Phase::Ended);
    }

    #[test]
    fn test_skip_ahead_from_showing() {
        let mut state = SessionState::default();
        state.show(0, sample_question("a", 0), 30);
        state.local_answer_index = Some(3);

        assert!(state.show(1, sample_question("b", 2), 30));
        assert_eq!(state.local_answer_index, None);
        assert!(state.accepts_answers());
    }

    #[test]
    fn test_session_error_blocking() {
        assert!(SessionError::CannotStart(LoadError::Empty).is_blocking());
        assert!(!SessionError::StaleQuestions(LoadError::Empty).is_blocking());
    }
}
