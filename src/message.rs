//! Broadcast protocol
//!
//! Every message exchanged between clients is one variant of the tagged
//! `Message` union wrapped in an `Envelope` naming the session and sender.
//! Payloads are checked when they cross the channel boundary: anything that
//! fails to parse or breaks a bound is rejected before it reaches the
//! coordinator.

use std::collections::HashMap;

use garde::Validate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    TruncatedVec,
    config::GameConfig,
    constants,
    leaderboard::LeaderboardEntry,
    question::Question,
    roster::{Id, Player},
    session_id::SessionId,
};

/// Vote tallies for the answer options of one question
pub type AnswerCounts = [usize; constants::question::MAX_ANSWER_COUNT];

/// A message on the broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Message {
    /// A client announces itself to the session
    PlayerJoined {
        /// The joining player
        player: Player,
        /// Whether this answers someone else's announcement
        #[serde(default)]
        reply: bool,
    },
    /// A client leaves the session
    PlayerLeft {
        /// The departing player
        player_id: Id,
    },
    /// A client claims the host slot
    HostClaim {
        /// The claimant
        player_id: Id,
    },
    /// The host starts the session with a frozen configuration
    GameStart {
        /// The host driving the session
        host_id: Id,
        /// The configuration for the whole session
        config: GameConfig,
    },
    /// The host shows a question and opens submissions
    QuestionShow {
        /// Index of the question within the session
        question_index: usize,
        /// The question being asked
        question: Question,
        /// Seconds left to answer
        time_limit_seconds: u64,
    },
    /// A participant answers the current question
    AnswerSubmitted {
        /// The answering player
        player_id: Id,
        /// The question being answered
        question_index: usize,
        /// The chosen option
        answer_index: usize,
        /// Milliseconds between the question appearing and the answer
        response_time_ms: u64,
    },
    /// The host reveals the correct answer and the updated scores
    Results {
        /// The question being revealed
        question_index: usize,
        /// Index of the correct option
        correct_answer_index: usize,
        /// How many players picked each option
        answer_counts: AnswerCounts,
        /// Accumulated score of every player
        scores: HashMap<Id, u64>,
    },
    /// The host shows the ranking after a reveal
    LeaderboardShow {
        /// The question the ranking follows
        question_index: usize,
        /// Ranked players
        entries: TruncatedVec<LeaderboardEntry>,
    },
    /// The host ends the session
    GameOver {
        /// Final ranking
        entries: TruncatedVec<LeaderboardEntry>,
    },
    /// The host moves the session forward
    NextQuestion {
        /// Who asked for it
        requested_by: Id,
    },
    /// The host returns the session to configuration
    GameReset {
        /// Who asked for it
        requested_by: Id,
    },
}

impl Message {
    /// A short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerJoined { .. } => "PlayerJoined",
            Self::PlayerLeft { .. } => "PlayerLeft",
            Self::HostClaim { .. } => "HostClaim",
            Self::GameStart { .. } => "GameStart",
            Self::QuestionShow { .. } => "QuestionShow",
            Self::AnswerSubmitted { .. } => "AnswerSubmitted",
            Self::Results { .. } => "Results",
            Self::LeaderboardShow { .. } => "LeaderboardShow",
            Self::GameOver { .. } => "GameOver",
            Self::NextQuestion { .. } => "NextQuestion",
            Self::GameReset { .. } => "GameReset",
        }
    }

    /// The client this message says it comes from
    ///
    /// A message whose author differs from the envelope sender is dropped.
    /// Messages that name no author return `None`.
    pub fn author(&self) -> Option<Id> {
        match self {
            Self::PlayerJoined { player, .. } => Some(player.id),
            Self::PlayerLeft { player_id }
            | Self::HostClaim { player_id }
            | Self::AnswerSubmitted { player_id, .. } => Some(*player_id),
            Self::GameStart { host_id, .. } => Some(*host_id),
            Self::NextQuestion { requested_by } | Self::GameReset { requested_by } => {
                Some(*requested_by)
            }
            Self::QuestionShow { .. }
            | Self::Results { .. }
            | Self::LeaderboardShow { .. }
            | Self::GameOver { .. } => None,
        }
    }

    /// Whether this is presence or election traffic
    ///
    /// Such messages are valid across resets; everything else belongs to one
    /// reset generation of the session. A client still in `config` adopts a
    /// newer generation seen on presence traffic.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            Self::PlayerJoined { .. } | Self::PlayerLeft { .. } | Self::HostClaim { .. }
        )
    }

    /// Whether only the host may send this message
    pub fn is_host_only(&self) -> bool {
        !self.is_presence() && !matches!(self, Self::AnswerSubmitted { .. })
    }

    /// Checks the payload against the protocol bounds
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Invalid` describing the broken bound.
    pub fn check(&self) -> Result<(), DecodeError> {
        match self {
            Self::GameStart { config, .. } => config
                .check()
                .map_err(|e| DecodeError::Invalid(e.to_string())),
            Self::QuestionShow {
                question,
                time_limit_seconds,
                ..
            } => {
                question
                    .validate()
                    .map_err(|report| DecodeError::Invalid(report.to_string()))?;
                if *time_limit_seconds > constants::question::MAX_TIME_LIMIT {
                    return Err(DecodeError::Invalid(format!(
                        "time limit {time_limit_seconds}s is too long"
                    )));
                }
                Ok(())
            }
            Self::AnswerSubmitted { answer_index, .. }
            | Self::Results {
                correct_answer_index: answer_index,
                ..
            } if *answer_index >= constants::question::MAX_ANSWER_COUNT => Err(
                DecodeError::Invalid(format!("answer index {answer_index} is out of range")),
            ),
            _ => Ok(()),
        }
    }
}

/// Errors raised when decoding a payload from the channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not a well-formed envelope
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// The payload parsed but breaks a protocol bound
    #[error("invalid payload: {0}")]
    Invalid(String),
}

/// A message together with its routing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// The session the message belongs to
    pub session: SessionId,
    /// The client that broadcast the message
    pub sender: Id,
    /// How many resets the sender has seen in this session
    #[serde(default)]
    pub generation: u32,
    /// The message itself
    pub message: Message,
}

impl Envelope {
    /// Converts the envelope to a JSON string for transmission
    ///
    /// # Panics
    ///
    /// This method panics if serialization fails, which should never happen
    /// with the default JSON serializer for well-formed data.
    pub fn to_message(&self) -> String {
        serde_json::to_string(self).expect("default serializer cannot fail")
    }

    /// Parses and checks an envelope received from the channel
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Malformed` if the text is not an envelope, or
    /// `DecodeError::Invalid` if the payload breaks a protocol bound.
    pub fn from_message(text: &str) -> Result<Self, DecodeError> {
        let envelope: Self =
            serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        envelope.message.check()?;
        Ok(envelope)
    }
}
