//! Configuration constants for the quiz session
//!
//! This module contains all the limits and default delays used throughout
//! the session coordinator, so that validation and timing share one source
//! of truth.

/// Session-wide limits
pub mod session {
    /// Maximum number of questions a host may configure for one session
    pub const MAX_QUESTION_COUNT: usize = 100;
    /// Minimum number of questions a host may configure for one session
    pub const MIN_QUESTION_COUNT: usize = 1;
    /// Maximum number of players tracked by a single roster
    pub const MAX_PLAYER_COUNT: usize = 1000;
    /// Maximum number of leaderboard rows carried in one broadcast
    pub const LEADERBOARD_LIMIT: usize = 50;
}

/// Per-question configuration constants
pub mod question {
    /// Minimum time limit in seconds for answering a question
    pub const MIN_TIME_LIMIT: u64 = 5;
    /// Maximum time limit in seconds for answering a question
    pub const MAX_TIME_LIMIT: u64 = 240;
    /// Time limit used when the host never changes it
    pub const DEFAULT_TIME_LIMIT: u64 = 30;
    /// Minimum number of answer options for a question
    pub const MIN_ANSWER_COUNT: usize = 2;
    /// Maximum number of answer options for a question
    pub const MAX_ANSWER_COUNT: usize = 4;
    /// Maximum length of a question prompt in characters
    pub const MAX_PROMPT_LENGTH: usize = 300;
    /// Maximum length of an answer text in characters
    pub const MAX_ANSWER_LENGTH: usize = 200;
    /// Points awarded for a correct answer
    pub const POINTS_PER_CORRECT: u64 = 1;
}

/// Phase delay constants
pub mod timing {
    /// Seconds between the reveal and the leaderboard
    pub const DEFAULT_REVEAL_DELAY: u64 = 5;
    /// Seconds the leaderboard stays up before auto-advancing
    pub const DEFAULT_LEADERBOARD_DELAY: u64 = 5;
    /// Seconds a fresh client waits for an existing host claim
    pub const DEFAULT_ELECTION_GRACE: u64 = 1;
    /// Upper bound for any of the delays above
    pub const MAX_DELAY: u64 = 60;
}

/// Player display name constants
pub mod names {
    /// Maximum length of a display name in characters
    pub const MAX_LENGTH: usize = 30;
}
