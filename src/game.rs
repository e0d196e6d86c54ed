//! Session coordinator
//!
//! One `Game` lives in each client process and owns everything that client
//! knows about the session: the roster, the election, the lifecycle state,
//! the answer aggregator, the score ledger and the single countdown slot.
//!
//! The coordinator never blocks and never spawns anything. It is driven by
//! three kinds of input, all of which must be serialized by the caller:
//! envelopes arriving from the broadcast channel, alarms coming back from the
//! scheduler, and actions from the view layer. Outgoing traffic goes through
//! a `BroadcastChannel`, timed wake-ups through a `schedule_message` closure.
//!
//! The elected host drives every transition and broadcasts it; everybody else
//! replays the host's messages. Messages are checked against the current
//! phase and question index, so duplicates, stale copies and reordering are
//! ignored rather than treated as errors.

use std::collections::HashMap;

use garde::Validate;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use web_time::{Duration, Instant};

use crate::{
    aggregator::{Aggregator, SubmitOutcome},
    channel::BroadcastChannel,
    config::{self, ConfigPatch, GameConfig, Timing},
    constants,
    election::{ClaimOutcome, Election},
    TruncatedVec,
    leaderboard::{self, FinalSummary, Leaderboard, LeaderboardEntry},
    message::{AnswerCounts, Envelope, Message},
    names,
    presentation::{Action, EventKind, Observers, SessionEvent, View},
    question::{self, LoadError, Question, QuestionBank},
    roster::{Id, Player, Roster},
    session_id::SessionId,
    state::{Phase, SessionError, SessionState},
    timer::{Alarm, TimerEvent, TimerPurpose, Timers},
};

/// Errors returned for rejected actions
///
/// A rejected action leaves the session untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Only the host may perform this action
    #[error("only the host can do this")]
    NotHost,
    /// The action does not apply to the current phase
    #[error("not allowed during the {0:?} phase")]
    WrongPhase(Phase),
    /// No usable question is loaded
    #[error("no questions available")]
    NoQuestions,
    /// The configuration change breaks a bound
    #[error(transparent)]
    InvalidConfig(#[from] config::Error),
    /// The requested display name is unacceptable
    #[error(transparent)]
    Name(#[from] names::Error),
    /// This client already answered the current question
    #[error("already answered")]
    AlreadyAnswered,
    /// The chosen option does not exist
    #[error("answer {0} does not exist")]
    AnswerOutOfRange(usize),
}

/// The per-process session coordinator
#[derive(Debug)]
pub struct Game {
    /// The session this client belongs to
    session: SessionId,
    /// This client
    local: Player,
    /// Number of resets seen in this session
    generation: u32,
    election: Election,
    roster: Roster,
    /// Settings as edited by the host
    config: GameConfig,
    /// Settings frozen by `GameStart`
    running: Option<GameConfig>,
    timing: Timing,
    /// Last good question bank
    bank: Vec<Question>,
    /// Questions picked for the running session (host only)
    questions: Vec<Question>,
    state: SessionState,
    aggregator: Aggregator,
    leaderboard: Leaderboard,
    /// A ranking that arrived before the results it follows
    pending_leaderboard: Option<(usize, TruncatedVec<LeaderboardEntry>)>,
    timers: Timers,
    observers: Observers,
    /// When the current question appeared on this client
    shown_at: Option<Instant>,
    rng: fastrand::Rng,
}

/// Name used for players whose requested name is rejected
fn fallback_name(id: Id) -> String {
    format!("Player {}", id.to_string().chars().take(8).collect::<String>())
}

impl Game {
    /// Creates the coordinator for one client
    ///
    /// An empty display name is replaced by a generated one.
    ///
    /// # Errors
    ///
    /// Returns `Error::Name` if the requested name is too long or
    /// inappropriate, or `Error::InvalidConfig` if `timing` breaks a bound.
    pub fn new(
        session: SessionId,
        id: Id,
        display_name: &str,
        timing: Timing,
    ) -> Result<Self, Error> {
        timing
            .validate()
            .map_err(|report| config::Error::Invalid(report.to_string()))?;
        let display_name = names::sanitize_or_generate(display_name, timing.name_style)?;

        Ok(Self {
            session,
            local: Player::new(id, display_name),
            generation: 0,
            election: Election::new(id),
            roster: Roster::default(),
            config: GameConfig::default(),
            running: None,
            timing,
            bank: Vec::new(),
            questions: Vec::new(),
            state: SessionState::default(),
            aggregator: Aggregator::default(),
            leaderboard: Leaderboard::default(),
            pending_leaderboard: None,
            timers: Timers::default(),
            observers: Observers::default(),
            shown_at: None,
            rng: fastrand::Rng::new(),
        })
    }

    /// Seeds the generator used to shuffle questions
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self
    }

    /// This client's id
    pub fn id(&self) -> Id {
        self.local.id
    }

    /// This client's player record
    pub fn player(&self) -> &Player {
        &self.local
    }

    /// The session this client belongs to
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Number of resets seen in this session
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The session state
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Players known to this client
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Whether this client is the host
    pub fn am_host(&self) -> bool {
        self.election.am_host()
    }

    /// The host this client follows
    pub fn host(&self) -> Option<Id> {
        self.election.host()
    }

    /// The settings in effect: frozen ones while a session runs, else the edited ones
    pub fn settings(&self) -> &GameConfig {
        self.running.as_ref().unwrap_or(&self.config)
    }

    /// The answer aggregator for the current question
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// The live countdown, if any
    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    /// Summary of the finished session
    pub fn final_summary(&self) -> Option<&FinalSummary> {
        (self.state.phase == Phase::Ended).then(|| self.leaderboard.final_summary())
    }

    /// Registers a view callback for one kind of event
    pub fn subscribe<F: FnMut(&SessionEvent) + 'static>(&mut self, kind: EventKind, callback: F) {
        self.observers.subscribe(kind, callback);
    }

    /// Registers a view callback for every kind of event
    pub fn subscribe_all<F: FnMut(&SessionEvent) + Clone + 'static>(&mut self, callback: F) {
        self.observers.subscribe_all(callback);
    }

    fn emit(&mut self, event: SessionEvent) {
        self.observers.publish(&event);
    }

    fn send<C: BroadcastChannel>(&self, channel: &C, message: Message) {
        trace!(kind = message.name(), generation = self.generation, "broadcasting");
        channel.broadcast(&Envelope {
            session: self.session,
            sender: self.local.id,
            generation: self.generation,
            message,
        });
    }

    fn set_error(&mut self, error: Option<SessionError>) {
        if self.state.error == error {
            return;
        }
        self.state.error.clone_from(&error);
        if let Some(error) = error {
            self.emit(SessionEvent::Error(error));
        }
    }

    fn emit_host_changed(&mut self) {
        self.emit(SessionEvent::HostChanged {
            host: self.election.host(),
            am_host: self.election.am_host(),
        });
    }

    fn emit_roster_changed(&mut self) {
        self.emit(SessionEvent::RosterChanged {
            players: self.roster.len(),
        });
    }
}

impl Game {
    /// Announces this client on the channel
    ///
    /// The host slot is claimed after the election grace period unless an
    /// existing host announces itself first.
    pub fn join<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: S,
        channel: C,
    ) {
        info!(player = %self.local.id, session = %self.session, "joining session");
        if let Err(error) = self.roster.add(self.local.clone()) {
            warn!(%error, "cannot add the local player to the roster");
        }
        self.send(
            &channel,
            Message::PlayerJoined {
                player: self.local.clone(),
                reply: false,
            },
        );
        self.emit_roster_changed();
        self.timers.start_countdown(
            self.timing.election_grace_seconds,
            TimerPurpose::Election,
            schedule_message,
        );
    }

    /// Announces that this client is leaving and stops its countdown
    pub fn leave<C: BroadcastChannel>(&mut self, channel: C) {
        info!(player = %self.local.id, "leaving session");
        self.timers.cancel_all();
        self.send(
            &channel,
            Message::PlayerLeft {
                player_id: self.local.id,
            },
        );
    }

    /// Loads the question bank
    ///
    /// A failed or empty load keeps the previous bank if there is one. With
    /// no usable bank the session cannot start and the error is shown.
    ///
    /// # Errors
    ///
    /// Returns the `LoadError` reported by the bank, or `LoadError::Empty`
    /// if it returned no questions.
    pub fn load_questions<B: QuestionBank + ?Sized>(&mut self, bank: &B) -> Result<usize, LoadError> {
        let loaded = bank.load().and_then(|questions| {
            if questions.is_empty() {
                Err(LoadError::Empty)
            } else {
                Ok(questions)
            }
        });

        match loaded {
            Ok(questions) => {
                info!(count = questions.len(), "question bank loaded");
                self.bank = questions;
                self.set_error(None);
                self.refresh_availability();
                Ok(self.bank.len())
            }
            Err(error) => {
                warn!(%error, "question bank failed to load");
                let session_error = if self.bank.is_empty() {
                    SessionError::CannotStart(error.clone())
                } else {
                    SessionError::StaleQuestions(error.clone())
                };
                self.set_error(Some(session_error));
                Err(error)
            }
        }
    }

    /// Re-checks whether the loaded bank can serve the current settings
    fn refresh_availability(&mut self) {
        if self.bank.is_empty() {
            return;
        }
        match question::select(self.bank.clone(), &self.config, None) {
            Ok(_) => {
                if self.state.error.as_ref().is_some_and(SessionError::is_blocking) {
                    self.set_error(None);
                }
            }
            Err(error) => self.set_error(Some(SessionError::CannotStart(error))),
        }
    }

    /// Snapshot of everything the view layer renders
    pub fn view(&self) -> View {
        let question = self.state.current_question.as_ref();
        let answers = question
            .map(|q| q.answers.iter().map(|a| a.text.clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        let correctness = self
            .state
            .correct_answer_index
            .map(|correct| (0..answers.len()).map(|i| i == correct).collect());

        View {
            phase: self.state.phase,
            question_index: self.state.current_question_index,
            question_count: self.settings().number_of_questions,
            question_text: question.map(|q| q.prompt.clone()),
            answers,
            remaining_seconds: self.state.remaining_seconds,
            answer_count: self.state.answered_player_ids.len(),
            correctness,
            local_answer_index: self.state.local_answer_index,
            local_score: self
                .state
                .per_player_score
                .get(&self.local.id)
                .copied()
                .unwrap_or_default(),
            leaderboard: self.state.leaderboard.clone(),
            players: self.roster.names(),
            am_host: self.election.am_host(),
            settings_enabled: self.election.am_host() && self.state.phase == Phase::Config,
            config: self.settings().clone(),
            error: self.state.error.as_ref().map(ToString::to_string),
        }
    }
}

impl Game {
    /// Handles an envelope delivered by the broadcast channel
    ///
    /// Envelopes for other sessions, this client's own echoes, invalid
    /// payloads and messages from an earlier reset are dropped.
    pub fn receive_envelope<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        envelope: Envelope,
        mut schedule_message: S,
        channel: C,
    ) {
        let Envelope {
            session,
            sender,
            generation,
            message,
        } = envelope;

        if session != self.session {
            trace!(%session, "dropping envelope for another session");
            return;
        }
        if sender == self.local.id {
            return;
        }
        if let Err(error) = message.check() {
            warn!(%sender, %error, "dropping invalid message");
            return;
        }
        if message.author().is_some_and(|author| author != sender) {
            warn!(%sender, kind = message.name(), "dropping message sent on behalf of another client");
            return;
        }

        if message.is_presence() {
            if generation > self.generation && self.state.phase == Phase::Config {
                self.catch_up_with_reset(generation);
            }
        } else {
            if generation < self.generation {
                trace!(%sender, generation, kind = message.name(), "dropping message from before a reset");
                return;
            }
            if message.is_host_only() && !self.accept_host_message(sender, &message) {
                return;
            }
            if generation > self.generation {
                if !message.is_host_only() {
                    trace!(%sender, generation, "dropping message from a reset not seen yet");
                    return;
                }
                info!(generation, "host reset the session");
                self.apply_reset(generation);
            }
        }

        trace!(%sender, kind = message.name(), "received");

        match message {
            Message::PlayerJoined { player, reply } => {
                self.on_player_joined(player, reply, &channel);
            }
            Message::PlayerLeft { player_id } => {
                self.on_player_left(player_id, &mut schedule_message, &channel);
            }
            Message::HostClaim { player_id } => self.on_host_claim(player_id, &channel),
            Message::GameStart { config, .. } => {
                self.election.lock();
                let open = self.state.phase == Phase::Config || self.running.is_none();
                if open && self.running.as_ref() != Some(&config) {
                    debug!(?config, "session settings frozen by host");
                    self.running = Some(config);
                    self.emit(SessionEvent::ConfigChanged);
                }
            }
            Message::QuestionShow {
                question_index,
                question,
                time_limit_seconds,
            } => {
                let option_count = question.answers.len();
                if self
                    .state
                    .show(question_index, question, time_limit_seconds)
                {
                    self.begin_question(
                        question_index,
                        option_count,
                        time_limit_seconds,
                        &mut schedule_message,
                    );
                } else {
                    trace!(question_index, "ignoring stale question");
                }
            }
            Message::AnswerSubmitted {
                player_id,
                question_index,
                answer_index,
                response_time_ms,
            } => self.record_answer(
                player_id,
                question_index,
                answer_index,
                response_time_ms,
                &mut schedule_message,
                &channel,
            ),
            Message::Results {
                question_index,
                correct_answer_index,
                answer_counts,
                scores,
            } => self.on_results(question_index, correct_answer_index, answer_counts, &scores),
            Message::LeaderboardShow {
                question_index,
                entries,
            } => self.on_leaderboard(question_index, entries),
            Message::GameOver { entries } => {
                let exact_count = entries.exact_count();
                if self.state.end(entries.items().to_vec(), exact_count) {
                    self.pending_leaderboard = None;
                    self.timers.cancel_all();
                    self.aggregator.close();
                    self.emit(SessionEvent::PhaseChanged(Phase::Ended));
                    self.emit(SessionEvent::LeaderboardUpdated);
                }
            }
            Message::NextQuestion { requested_by } => {
                trace!(%requested_by, "host moved the session on");
            }
            Message::GameReset { requested_by } => {
                trace!(%requested_by, "reset already applied");
            }
        }
    }

    /// Decides whether a host-only message comes from the host
    fn accept_host_message(&mut self, sender: Id, message: &Message) -> bool {
        match self.election.host() {
            Some(host) if host == sender => true,
            None => {
                debug!(%sender, "following the client that drives the session");
                self.election.follow(sender);
                self.cancel_election_timer();
                self.emit_host_changed();
                true
            }
            Some(_) if matches!(message, Message::GameStart { .. }) && !self.election.is_locked() => {
                if self.election.am_host() {
                    warn!(%sender, "another client started the session first; giving up the host slot");
                }
                self.election.follow(sender);
                self.cancel_election_timer();
                self.emit_host_changed();
                true
            }
            Some(host) => {
                debug!(%sender, %host, kind = message.name(), "ignoring host message from a non-host");
                false
            }
        }
    }

    fn cancel_election_timer(&mut self) {
        if self.timers.purpose() == Some(TimerPurpose::Election) {
            self.timers.cancel_all();
        }
    }

    fn on_player_joined<C: BroadcastChannel>(&mut self, player: Player, reply: bool, channel: &C) {
        let display_name = names::sanitize(&player.display_name).unwrap_or_else(|error| {
            debug!(player = %player.id, %error, "replacing rejected display name");
            fallback_name(player.id)
        });

        match self.roster.add(Player::new(player.id, display_name)) {
            Ok(true) => {
                debug!(player = %player.id, "player joined");
                self.emit_roster_changed();
            }
            Ok(false) => {}
            Err(error) => {
                warn!(player = %player.id, %error, "cannot add player");
                return;
            }
        }

        if reply {
            return;
        }

        self.send(
            channel,
            Message::PlayerJoined {
                player: self.local.clone(),
                reply: true,
            },
        );
        if self.election.am_host() {
            self.announce_session(channel);
        }
    }

    fn on_player_left<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        player_id: Id,
        schedule_message: &mut S,
        channel: &C,
    ) {
        if self.roster.remove(player_id).is_none() {
            return;
        }
        debug!(player = %player_id, "player left");
        self.aggregator.remove_known(player_id);
        self.emit_roster_changed();

        if self.election.host() == Some(player_id) {
            self.election.forget(player_id);
            if self.election.is_vacant() {
                self.emit_host_changed();
                self.timers.start_countdown(
                    self.timing.election_grace_seconds,
                    TimerPurpose::Election,
                    &mut *schedule_message,
                );
            }
        }

        if self.election.am_host()
            && self.state.phase == Phase::Showing
            && self.aggregator.is_complete()
        {
            self.reveal(schedule_message, channel);
        }
    }

    fn on_host_claim<C: BroadcastChannel>(&mut self, claimant: Id, channel: &C) {
        match self.election.observe_claim(claimant) {
            ClaimOutcome::Adopted => {
                self.cancel_election_timer();
                self.emit_host_changed();
            }
            ClaimOutcome::Ignored if self.election.am_host() => {
                debug!(%claimant, "reasserting host claim");
                self.announce_session(channel);
            }
            ClaimOutcome::Ignored => {}
        }
    }

    fn on_results(
        &mut self,
        question_index: usize,
        correct_answer_index: usize,
        answer_counts: AnswerCounts,
        scores: &HashMap<Id, u64>,
    ) {
        if !self
            .state
            .reveal(question_index, correct_answer_index, answer_counts)
        {
            trace!(question_index, "ignoring repeated or stale results");
            return;
        }

        self.timers.cancel_all();
        self.aggregator.close();
        self.leaderboard.apply_totals(question_index, scores);
        self.state.per_player_score = self.leaderboard.totals().clone();

        self.emit(SessionEvent::PhaseChanged(Phase::Revealed));
        self.emit(SessionEvent::Revealed {
            correct_answer_index,
        });

        let pending = self
            .pending_leaderboard
            .take_if(|(index, _)| *index <= question_index);
        if let Some((index, entries)) = pending.filter(|(index, _)| *index == question_index) {
            debug!(question_index, "applying ranking that arrived early");
            self.on_leaderboard(index, entries);
        }
    }

    fn on_leaderboard(&mut self, question_index: usize, entries: TruncatedVec<LeaderboardEntry>) {
        let exact_count = entries.exact_count();
        if self
            .state
            .show_leaderboard(question_index, entries.items().to_vec(), exact_count)
        {
            self.emit(SessionEvent::PhaseChanged(Phase::Leaderboard));
            self.emit(SessionEvent::LeaderboardUpdated);
            return;
        }

        let ahead = match self.state.phase {
            Phase::Config | Phase::Showing => question_index >= self.state.current_question_index,
            Phase::Revealed | Phase::Leaderboard => {
                question_index > self.state.current_question_index
            }
            Phase::Ended => false,
        };
        let newer = self
            .pending_leaderboard
            .as_ref()
            .is_none_or(|(pending, _)| question_index > *pending);
        if ahead && newer {
            trace!(question_index, "keeping ranking until its results arrive");
            self.pending_leaderboard = Some((question_index, entries));
        } else {
            trace!(question_index, "ignoring stale ranking");
        }
    }

    /// Tells everyone who the host is and, mid-session, where the session stands
    fn announce_session<C: BroadcastChannel>(&self, channel: &C) {
        self.send(
            channel,
            Message::HostClaim {
                player_id: self.local.id,
            },
        );

        let Some(config) = self.running.clone() else {
            return;
        };
        self.send(
            channel,
            Message::GameStart {
                host_id: self.local.id,
                config,
            },
        );

        let question_index = self.state.current_question_index;
        match self.state.phase {
            Phase::Config => {}
            Phase::Showing => {
                if let Some(question) = self.state.current_question.clone() {
                    self.send(
                        channel,
                        Message::QuestionShow {
                            question_index,
                            question,
                            time_limit_seconds: self.state.remaining_seconds,
                        },
                    );
                }
            }
            Phase::Revealed => self.send(channel, self.results_message()),
            Phase::Leaderboard => {
                self.send(channel, self.results_message());
                self.send(
                    channel,
                    Message::LeaderboardShow {
                        question_index,
                        entries: leaderboard::truncate(&self.state.leaderboard),
                    },
                );
            }
            Phase::Ended => self.send(
                channel,
                Message::GameOver {
                    entries: leaderboard::truncate(&self.state.leaderboard),
                },
            ),
        }
    }

    fn results_message(&self) -> Message {
        Message::Results {
            question_index: self.state.current_question_index,
            correct_answer_index: self.state.correct_answer_index.unwrap_or_default(),
            answer_counts: self.state.answer_counts,
            scores: self.state.per_player_score.clone(),
        }
    }

    /// Opens the question that was just shown on this client
    fn begin_question<S: FnMut(Alarm, Duration)>(
        &mut self,
        question_index: usize,
        option_count: usize,
        time_limit_seconds: u64,
        schedule_message: &mut S,
    ) {
        self.aggregator
            .begin(question_index, option_count, self.roster.ids());
        self.timers.start_countdown(
            time_limit_seconds,
            TimerPurpose::Question,
            &mut *schedule_message,
        );
        self.shown_at = Some(Instant::now());
        let held = self.aggregator.answered_ids();
        self.state.answered_player_ids.extend(held);

        self.emit(SessionEvent::PhaseChanged(Phase::Showing));
        self.emit(SessionEvent::QuestionShown { question_index });
        if !self.state.answered_player_ids.is_empty() {
            self.emit(SessionEvent::AnswerCountChanged {
                answered: self.state.answered_player_ids.len(),
            });
        }
    }

    fn record_answer<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        player_id: Id,
        question_index: usize,
        answer_index: usize,
        response_time_ms: u64,
        schedule_message: &mut S,
        channel: &C,
    ) {
        match self
            .aggregator
            .submit(player_id, question_index, answer_index, response_time_ms)
        {
            SubmitOutcome::Recorded => {
                self.state.answered_player_ids.insert(player_id);
                self.emit(SessionEvent::AnswerCountChanged {
                    answered: self.state.answered_player_ids.len(),
                });
                if self.election.am_host() && self.aggregator.is_complete() {
                    debug!(question_index, "every player answered");
                    self.reveal(schedule_message, channel);
                }
            }
            outcome => {
                trace!(player = %player_id, question_index, ?outcome, "submission not recorded");
            }
        }
    }
}

impl Game {
    /// Handles an alarm delivered by the scheduler
    pub fn receive_alarm<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        alarm: Alarm,
        mut schedule_message: S,
        channel: C,
    ) {
        let Some(event) = self.timers.on_alarm(alarm, &mut schedule_message) else {
            return;
        };

        match event {
            TimerEvent::Tick {
                purpose: TimerPurpose::Question,
                remaining,
            } => {
                self.state.remaining_seconds = remaining;
                self.emit(SessionEvent::Tick {
                    remaining_seconds: remaining,
                });
                if self.election.am_host()
                    && self.state.phase == Phase::Showing
                    && self.aggregator.is_complete()
                {
                    self.reveal(&mut schedule_message, &channel);
                }
            }
            TimerEvent::Tick { .. } => {}
            TimerEvent::Expired {
                purpose: TimerPurpose::Election,
            } => {
                if let Some(host) = self.election.claim() {
                    info!(%host, "claiming the host slot");
                    self.send(&channel, Message::HostClaim { player_id: host });
                    self.emit_host_changed();
                }
            }
            TimerEvent::Expired {
                purpose: TimerPurpose::Question,
            } => {
                self.state.remaining_seconds = 0;
                self.emit(SessionEvent::Tick {
                    remaining_seconds: 0,
                });
                if self.election.am_host() {
                    debug!("question timed out");
                    self.reveal(&mut schedule_message, &channel);
                }
            }
            TimerEvent::Expired {
                purpose: TimerPurpose::RevealDelay,
            } => {
                if self.election.am_host() {
                    self.show_leaderboard(&mut schedule_message, &channel);
                }
            }
            TimerEvent::Expired {
                purpose: TimerPurpose::LeaderboardDelay,
            } => {
                if self.election.am_host() {
                    self.advance(&mut schedule_message, &channel);
                }
            }
        }
    }

    /// Applies an action from the view layer
    ///
    /// # Errors
    ///
    /// Returns an `Error` describing why the action was rejected; the session
    /// is left untouched then.
    pub fn perform<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        action: Action,
        mut schedule_message: S,
        channel: C,
    ) -> Result<(), Error> {
        match action {
            Action::AnswerPressed(answer_index) => {
                self.answer(answer_index, &mut schedule_message, &channel)
            }
            Action::StartGame => self.start(&mut schedule_message, &channel),
            Action::NextQuestion => self.next(&mut schedule_message, &channel),
            Action::ConfigChange(patch) => self.change_config(&patch),
            Action::ResetGame => self.reset(&channel),
        }
    }

    fn answer<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        answer_index: usize,
        schedule_message: &mut S,
        channel: &C,
    ) -> Result<(), Error> {
        if self.state.phase != Phase::Showing {
            return Err(Error::WrongPhase(self.state.phase));
        }
        if self.state.local_answer_index.is_some() {
            return Err(Error::AlreadyAnswered);
        }
        let option_count = self
            .state
            .current_question
            .as_ref()
            .map_or(0, |q| q.answers.len());
        if answer_index >= option_count {
            return Err(Error::AnswerOutOfRange(answer_index));
        }

        let question_index = self.state.current_question_index;
        let response_time_ms = self
            .shown_at
            .map_or(0, |shown_at| shown_at.elapsed().as_millis() as u64);
        self.state.local_answer_index = Some(answer_index);

        self.send(
            channel,
            Message::AnswerSubmitted {
                player_id: self.local.id,
                question_index,
                answer_index,
                response_time_ms,
            },
        );
        self.record_answer(
            self.local.id,
            question_index,
            answer_index,
            response_time_ms,
            schedule_message,
            channel,
        );
        Ok(())
    }

    fn change_config(&mut self, patch: &ConfigPatch) -> Result<(), Error> {
        if !self.election.am_host() {
            return Err(Error::NotHost);
        }
        if self.state.phase != Phase::Config {
            return Err(Error::WrongPhase(self.state.phase));
        }

        self.config = patch.apply(&self.config)?;
        debug!(config = ?self.config, "settings changed");
        self.emit(SessionEvent::ConfigChanged);
        self.refresh_availability();
        Ok(())
    }

    fn start<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: &mut S,
        channel: &C,
    ) -> Result<(), Error> {
        if !self.election.am_host() {
            return Err(Error::NotHost);
        }
        if self.state.phase != Phase::Config {
            return Err(Error::WrongPhase(self.state.phase));
        }

        let shuffle = self.timing.shuffle_questions.then_some(&mut self.rng);
        let questions = match question::select(self.bank.clone(), &self.config, shuffle) {
            Ok(questions) => questions,
            Err(error) => {
                warn!(%error, "cannot start the session");
                self.set_error(Some(SessionError::CannotStart(error)));
                return Err(Error::NoQuestions);
            }
        };

        let config = GameConfig {
            number_of_questions: questions.len(),
            ..self.config.clone()
        };
        info!(questions = questions.len(), players = self.roster.len(), "starting session");

        self.questions = questions;
        self.running = Some(config.clone());
        self.election.lock();
        self.leaderboard = Leaderboard::default();

        self.send(
            channel,
            Message::GameStart {
                host_id: self.local.id,
                config,
            },
        );
        self.emit(SessionEvent::ConfigChanged);
        self.show_question(0, schedule_message, channel);
        Ok(())
    }

    fn next<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: &mut S,
        channel: &C,
    ) -> Result<(), Error> {
        if !self.election.am_host() {
            return Err(Error::NotHost);
        }
        if matches!(self.state.phase, Phase::Config | Phase::Ended) {
            return Err(Error::WrongPhase(self.state.phase));
        }

        self.send(
            channel,
            Message::NextQuestion {
                requested_by: self.local.id,
            },
        );
        match self.state.phase {
            Phase::Showing => self.reveal(schedule_message, channel),
            Phase::Revealed => self.show_leaderboard(schedule_message, channel),
            Phase::Leaderboard => self.advance(schedule_message, channel),
            Phase::Config | Phase::Ended => {}
        }
        Ok(())
    }

    fn reset<C: BroadcastChannel>(&mut self, channel: &C) -> Result<(), Error> {
        if !self.election.am_host() {
            return Err(Error::NotHost);
        }
        if self.state.phase == Phase::Config {
            return Err(Error::WrongPhase(Phase::Config));
        }

        info!("resetting session");
        self.apply_reset(self.generation + 1);
        self.send(
            channel,
            Message::GameReset {
                requested_by: self.local.id,
            },
        );
        Ok(())
    }

    /// Adopts a reset generation learned from presence traffic
    ///
    /// Only called in `config`. A client that never saw the session start has
    /// nothing to undo; one holding settings from before the reset drops them.
    fn catch_up_with_reset(&mut self, generation: u32) {
        if self.running.is_some() {
            info!(generation, "host reset the session");
            self.apply_reset(generation);
        } else {
            debug!(generation, "catching up with an earlier reset");
            self.generation = generation;
            self.aggregator.clear();
            self.pending_leaderboard = None;
        }
    }

    /// Returns to configuration under a new reset generation
    fn apply_reset(&mut self, generation: u32) {
        self.generation = generation;
        self.timers.cancel_all();
        self.aggregator.clear();
        self.leaderboard = Leaderboard::default();
        self.pending_leaderboard = None;
        self.questions.clear();
        self.running = None;
        self.shown_at = None;

        let error = self.state.error.take();
        self.state = SessionState {
            error,
            ..SessionState::default()
        };
        self.election.unlock();

        self.emit(SessionEvent::Reset);
        self.emit(SessionEvent::PhaseChanged(Phase::Config));
    }

    fn show_question<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        question_index: usize,
        schedule_message: &mut S,
        channel: &C,
    ) {
        let Some(question) = self.questions.get(question_index).cloned() else {
            self.end(channel);
            return;
        };
        let time_limit_seconds = self.settings().time_limit_seconds;
        let option_count = question.answers.len();

        if !self
            .state
            .show(question_index, question.clone(), time_limit_seconds)
        {
            return;
        }
        debug!(question_index, question = %question.id, "showing question");

        self.send(
            channel,
            Message::QuestionShow {
                question_index,
                question,
                time_limit_seconds,
            },
        );
        self.begin_question(
            question_index,
            option_count,
            time_limit_seconds,
            schedule_message,
        );
    }

    fn reveal<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: &mut S,
        channel: &C,
    ) {
        if self.state.phase != Phase::Showing {
            return;
        }
        let question_index = self.state.current_question_index;
        let Some(correct_answer_index) = self
            .state
            .current_question
            .as_ref()
            .and_then(Question::correct_index)
        else {
            warn!(question_index, "current question has no correct answer");
            return;
        };

        self.timers.cancel_all();
        self.aggregator.close();

        let mut scores: HashMap<Id, u64> = self.leaderboard.totals().clone();
        for id in self.roster.ids() {
            scores.entry(id).or_default();
        }
        for id in self.aggregator.players_choosing(correct_answer_index) {
            *scores.entry(id).or_default() += constants::question::POINTS_PER_CORRECT;
        }
        let answer_counts = self.aggregator.answer_counts();

        info!(
            question_index,
            correct_answer_index,
            answered = self.aggregator.answer_count(),
            coverage = self.aggregator.coverage(),
            "revealing answer"
        );

        self.state
            .reveal(question_index, correct_answer_index, answer_counts);
        self.leaderboard.apply_totals(question_index, &scores);
        self.state.per_player_score = self.leaderboard.totals().clone();

        self.send(
            channel,
            Message::Results {
                question_index,
                correct_answer_index,
                answer_counts,
                scores,
            },
        );
        self.emit(SessionEvent::PhaseChanged(Phase::Revealed));
        self.emit(SessionEvent::Revealed {
            correct_answer_index,
        });

        self.timers.start_countdown(
            self.timing.reveal_delay_seconds,
            TimerPurpose::RevealDelay,
            &mut *schedule_message,
        );
    }

    fn show_leaderboard<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: &mut S,
        channel: &C,
    ) {
        if self.state.phase != Phase::Revealed {
            return;
        }
        self.timers.cancel_all();

        let question_index = self.state.current_question_index;
        let entries = leaderboard::generate(&self.state.per_player_score, &self.roster);
        let truncated = leaderboard::truncate(&entries);
        let exact_count = entries.len();
        self.state
            .show_leaderboard(question_index, entries, exact_count);

        self.send(
            channel,
            Message::LeaderboardShow {
                question_index,
                entries: truncated,
            },
        );
        self.emit(SessionEvent::PhaseChanged(Phase::Leaderboard));
        self.emit(SessionEvent::LeaderboardUpdated);

        if self.settings().auto_advance {
            self.timers.start_countdown(
                self.timing.leaderboard_delay_seconds,
                TimerPurpose::LeaderboardDelay,
                &mut *schedule_message,
            );
        }
    }

    fn advance<S: FnMut(Alarm, Duration), C: BroadcastChannel>(
        &mut self,
        schedule_message: &mut S,
        channel: &C,
    ) {
        if self.state.phase != Phase::Leaderboard {
            return;
        }
        self.timers.cancel_all();

        let next_index = self.state.current_question_index + 1;
        if next_index >= self.questions.len() {
            self.end(channel);
        } else {
            self.show_question(next_index, schedule_message, channel);
        }
    }

    fn end<C: BroadcastChannel>(&mut self, channel: &C) {
        self.timers.cancel_all();
        self.aggregator.close();

        let entries = leaderboard::generate(&self.state.per_player_score, &self.roster);
        let truncated = leaderboard::truncate(&entries);
        let exact_count = entries.len();
        if !self.state.end(entries, exact_count) {
            return;
        }

        let summary = self.leaderboard.final_summary();
        info!(
            questions = summary.stats().len(),
            players = summary.player_count(),
            "session ended"
        );

        self.send(channel, Message::GameOver { entries: truncated });
        self.emit(SessionEvent::PhaseChanged(Phase::Ended));
        self.emit(SessionEvent::LeaderboardUpdated);
    }
}
