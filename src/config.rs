//! Session configuration
//!
//! `GameConfig` is owned by the host, edited while the session sits in the
//! `config` phase, broadcast once inside `GameStart` and frozen afterwards.
//! `Timing` holds the client-local delays of the lifecycle; it never travels
//! on the wire.

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants,
    names::NameStyle,
    question::Difficulty,
};

/// Errors raised when applying configuration changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The resulting configuration breaks a bound
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Host-owned settings for a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Seconds players have to answer each question
    #[serde(rename = "timeLimit")]
    #[garde(range(min = constants::question::MIN_TIME_LIMIT, max = constants::question::MAX_TIME_LIMIT))]
    pub time_limit_seconds: u64,
    /// How many questions the session runs for
    #[serde(rename = "numQuestions")]
    #[garde(range(min = constants::session::MIN_QUESTION_COUNT, max = constants::session::MAX_QUESTION_COUNT))]
    pub number_of_questions: usize,
    /// Only questions from this category are asked (None means any)
    #[garde(length(max = constants::question::MAX_ANSWER_LENGTH))]
    pub category: Option<String>,
    /// Only questions of this difficulty are asked (None means any)
    #[garde(skip)]
    pub difficulty: Option<Difficulty>,
    /// Whether the leaderboard advances on its own after a delay
    #[serde(default)]
    #[garde(skip)]
    pub auto_advance: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            time_limit_seconds: constants::question::DEFAULT_TIME_LIMIT,
            number_of_questions: 10,
            category: None,
            difficulty: None,
            auto_advance: true,
        }
    }
}

impl GameConfig {
    /// Validates the configuration against the session bounds
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` describing the first broken bound.
    pub fn check(&self) -> Result<(), Error> {
        self.validate().map_err(|report| Error::Invalid(report.to_string()))
    }
}

/// A partial configuration edit coming from the settings panel
///
/// Fields left as `None` keep their current value. `category` and
/// `difficulty` use a nested option so a patch can clear the filter; on the
/// wire an absent field keeps the filter and `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    /// New time limit in seconds
    pub time_limit_seconds: Option<u64>,
    /// New number of questions
    pub number_of_questions: Option<usize>,
    /// New category filter
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub category: Option<Option<String>>,
    /// New difficulty filter
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "::serde_with::rust::double_option"
    )]
    pub difficulty: Option<Option<Difficulty>>,
    /// New auto-advance flag
    pub auto_advance: Option<bool>,
}

impl ConfigPatch {
    /// Applies the patch on top of a configuration, validating the result
    ///
    /// # Errors
    ///
    /// Returns `Error::Invalid` if the patched configuration breaks a bound;
    /// the input configuration is left untouched.
    pub fn apply(&self, config: &GameConfig) -> Result<GameConfig, Error> {
        let mut next = config.clone();
        if let Some(time_limit) = self.time_limit_seconds {
            next.time_limit_seconds = time_limit;
        }
        if let Some(count) = self.number_of_questions {
            next.number_of_questions = count;
        }
        if let Some(category) = &self.category {
            next.category.clone_from(category);
        }
        if let Some(difficulty) = self.difficulty {
            next.difficulty = difficulty;
        }
        if let Some(auto_advance) = self.auto_advance {
            next.auto_advance = auto_advance;
        }
        next.check()?;
        Ok(next)
    }
}

/// Client-local delays and selection options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// Seconds between the reveal and the leaderboard
    #[garde(range(max = constants::timing::MAX_DELAY))]
    pub reveal_delay_seconds: u64,
    /// Seconds the leaderboard stays up when auto-advancing
    #[garde(range(max = constants::timing::MAX_DELAY))]
    pub leaderboard_delay_seconds: u64,
    /// Seconds a fresh client waits for an existing host before claiming
    #[garde(range(max = constants::timing::MAX_DELAY))]
    pub election_grace_seconds: u64,
    /// Whether the host shuffles the loaded bank before picking questions
    #[garde(skip)]
    pub shuffle_questions: bool,
    /// Style of generated names for players who leave theirs empty
    #[garde(dive)]
    pub name_style: NameStyle,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            reveal_delay_seconds: constants::timing::DEFAULT_REVEAL_DELAY,
            leaderboard_delay_seconds: constants::timing::DEFAULT_LEADERBOARD_DELAY,
            election_grace_seconds: constants::timing::DEFAULT_ELECTION_GRACE,
            shuffle_questions: false,
            name_style: NameStyle::default(),
        }
    }
}
