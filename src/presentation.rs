//! Presentation adapter
//!
//! The view layer never touches the coordinator's state directly. It reads
//! `View` snapshots, subscribes to `SessionEvent`s by kind, and pushes user
//! input back as `Action`s.

use std::fmt::Debug;

use enum_map::{Enum, EnumMap};
use serde::Serialize;
use serde_with::skip_serializing_none;

use crate::{
    config::{ConfigPatch, GameConfig},
    leaderboard::LeaderboardEntry,
    roster::Id,
    state::{Phase, SessionError},
};

/// Something the view layer may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The lifecycle entered a new phase
    PhaseChanged(Phase),
    /// A new question is visible
    QuestionShown {
        /// Index of the question
        question_index: usize,
    },
    /// The visible countdown moved
    Tick {
        /// Seconds left
        remaining_seconds: u64,
    },
    /// Another answer was counted
    AnswerCountChanged {
        /// Players who answered so far
        answered: usize,
    },
    /// The correct answer is visible
    Revealed {
        /// Index of the correct option
        correct_answer_index: usize,
    },
    /// New ranking rows are available
    LeaderboardUpdated,
    /// The host changed
    HostChanged {
        /// The host now followed
        host: Option<Id>,
        /// Whether this client is the host
        am_host: bool,
    },
    /// A player joined or left
    RosterChanged {
        /// Number of players known
        players: usize,
    },
    /// The host edited the settings
    ConfigChanged,
    /// Something went wrong that the player should see
    Error(SessionError),
    /// The session returned to configuration
    Reset,
}

/// Kinds of `SessionEvent`, used as subscription keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum)]
pub enum EventKind {
    /// `SessionEvent::PhaseChanged`
    PhaseChanged,
    /// `SessionEvent::QuestionShown`
    QuestionShown,
    /// `SessionEvent::Tick`
    Tick,
    /// `SessionEvent::AnswerCountChanged`
    AnswerCountChanged,
    /// `SessionEvent::Revealed`
    Revealed,
    /// `SessionEvent::LeaderboardUpdated`
    LeaderboardUpdated,
    /// `SessionEvent::HostChanged`
    HostChanged,
    /// `SessionEvent::RosterChanged`
    RosterChanged,
    /// `SessionEvent::ConfigChanged`
    ConfigChanged,
    /// `SessionEvent::Error`
    Error,
    /// `SessionEvent::Reset`
    Reset,
}

impl SessionEvent {
    /// The subscription key of this event
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PhaseChanged(_) => EventKind::PhaseChanged,
            Self::QuestionShown { .. } => EventKind::QuestionShown,
            Self::Tick { .. } => EventKind::Tick,
            Self::AnswerCountChanged { .. } => EventKind::AnswerCountChanged,
            Self::Revealed { .. } => EventKind::Revealed,
            Self::LeaderboardUpdated => EventKind::LeaderboardUpdated,
            Self::HostChanged { .. } => EventKind::HostChanged,
            Self::RosterChanged { .. } => EventKind::RosterChanged,
            Self::ConfigChanged => EventKind::ConfigChanged,
            Self::Error(_) => EventKind::Error,
            Self::Reset => EventKind::Reset,
        }
    }
}

type Callback = Box<dyn FnMut(&SessionEvent)>;

/// Subscriber table keyed by event kind
#[derive(Default)]
pub struct Observers {
    table: EnumMap<EventKind, Vec<Callback>>,
}

impl Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.table
                    .iter()
                    .filter(|(_, callbacks)| !callbacks.is_empty())
                    .map(|(kind, callbacks)| (kind, callbacks.len())),
            )
            .finish()
    }
}

impl Observers {
    /// Registers a callback for one kind of event
    pub fn subscribe<F: FnMut(&SessionEvent) + 'static>(&mut self, kind: EventKind, callback: F) {
        self.table[kind].push(Box::new(callback));
    }

    /// Registers a callback for every kind of event
    pub fn subscribe_all<F: FnMut(&SessionEvent) + Clone + 'static>(&mut self, callback: F) {
        for (_, callbacks) in &mut self.table {
            callbacks.push(Box::new(callback.clone()));
        }
    }

    /// Delivers an event to its subscribers in registration order
    pub fn publish(&mut self, event: &SessionEvent) {
        for callback in &mut self.table[event.kind()] {
            callback(event);
        }
    }
}

/// User input coming from the view layer
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// An answer button was pressed
    AnswerPressed(usize),
    /// The host pressed start
    StartGame,
    /// The host pressed next
    NextQuestion,
    /// The host edited the settings
    ConfigChange(ConfigPatch),
    /// The host pressed reset
    ResetGame,
}

/// Read-only snapshot of everything the view layer renders
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    /// Current phase
    pub phase: Phase,
    /// Index of the current question
    pub question_index: usize,
    /// Number of questions in the session
    pub question_count: usize,
    /// Text of the current question
    pub question_text: Option<String>,
    /// Texts of the answer buttons
    pub answers: Vec<String>,
    /// Seconds left on the countdown
    pub remaining_seconds: u64,
    /// Players who answered the current question
    pub answer_count: usize,
    /// For each answer, whether it is correct; only set once revealed
    pub correctness: Option<Vec<bool>>,
    /// What this client answered
    pub local_answer_index: Option<usize>,
    /// This client's accumulated score
    pub local_score: u64,
    /// Ranking rows
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Display names of everyone in the session in join order
    pub players: Vec<String>,
    /// Whether this client is the host
    pub am_host: bool,
    /// Whether the settings panel is editable
    pub settings_enabled: bool,
    /// The session settings
    pub config: GameConfig,
    /// Error message to display
    pub error: Option<String>,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    #[test]
    fn test_subscribers_only_receive_their_kind() {
        let mut observers = Observers::default();
        let ticks = Rc::new(RefCell::new(Vec::new()));
        let captured = ticks.clone();
        observers.subscribe(EventKind::Tick, move |event| {
            captured.borrow_mut().push(event.clone());
        });

        observers.publish(&SessionEvent::Tick {
            remaining_seconds: 4,
        });
        observers.publish(&SessionEvent::PhaseChanged(Phase::Revealed));

        assert_eq!(
            *ticks.borrow(),
            vec![SessionEvent::Tick {
                remaining_seconds: 4
            }]
        );
    }

    #[test]
    fn test_subscribe_all() {
        let mut observers = Observers::default();
        let count = Rc::new(RefCell::new(0));
        let captured = count.clone();
        observers.subscribe_all(move |_| *captured.borrow_mut() += 1);

        observers.publish(&SessionEvent::Reset);
        observers.publish(&SessionEvent::ConfigChanged);
        observers.publish(&SessionEvent::LeaderboardUpdated);

        assert_eq!(*count.borrow(), 3);
    }

    #[test]
    fn test_event_kind_matches_variant() {
        assert_eq!(
            SessionEvent::Revealed {
                correct_answer_index: 0
            }
            .kind(),
            EventKind::Revealed
        );
        assert_eq!(
            SessionEvent::Error(SessionError::CannotStart(crate::question::LoadError::Empty)).kind(),
            EventKind::Error
        );
    }

    #[test]
    fn test_observers_debug_lists_subscribed_kinds() {
        let mut observers = Observers::default();
        observers.subscribe(EventKind::Reset, |_| {});
        assert_eq!(format!("{observers:?}"), "{Reset: 1}");
    }
}
