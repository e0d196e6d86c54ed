//! Tokio event loop around one coordinator
//!
//! A `Game` expects its inputs one at a time. The `Driver` owns the game and
//! funnels everything into a single task: envelopes arriving from the bus,
//! alarms coming back from sleeping timer tasks, and requests from the view
//! layer sent through a cloneable `Handle`.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use web_time::Duration;

use crate::{
    channel::BroadcastChannel,
    game::{self, Game},
    message::Envelope,
    presentation::{Action, View},
    timer::Alarm,
};

/// A request for the driver task
#[derive(Debug)]
pub enum Input {
    /// Raw text received from the broadcast channel
    Envelope(String),
    /// A view-layer action, with an optional reply slot for its outcome
    Action(Action, Option<oneshot::Sender<Result<(), game::Error>>>),
    /// A request for a view snapshot
    View(oneshot::Sender<View>),
    /// Leave the session and stop the loop
    Leave,
}

/// Cloneable sender side of a `Driver`
#[derive(Debug, Clone)]
pub struct Handle {
    inputs: mpsc::UnboundedSender<Input>,
}

impl Handle {
    /// Hands a payload received from the bus to the driver
    ///
    /// # Returns
    ///
    /// `false` if the driver has stopped
    pub fn deliver(&self, text: impl Into<String>) -> bool {
        self.inputs.send(Input::Envelope(text.into())).is_ok()
    }

    /// Submits an action; the receiver resolves with its outcome
    pub fn perform(&self, action: Action) -> oneshot::Receiver<Result<(), game::Error>> {
        let (reply, outcome) = oneshot::channel();
        let _ = self.inputs.send(Input::Action(action, Some(reply)));
        outcome
    }

    /// Requests a snapshot of the view
    pub fn view(&self) -> oneshot::Receiver<View> {
        let (reply, view) = oneshot::channel();
        let _ = self.inputs.send(Input::View(reply));
        view
    }

    /// Asks the driver to leave the session
    pub fn leave(&self) {
        let _ = self.inputs.send(Input::Leave);
    }
}

/// Serializes every input of one client onto a single task
#[derive(Debug)]
pub struct Driver<C> {
    game: Game,
    channel: C,
    inputs: mpsc::UnboundedReceiver<Input>,
    alarms: mpsc::UnboundedReceiver<Alarm>,
    alarm_sender: mpsc::UnboundedSender<Alarm>,
}

/// Schedules an alarm by sleeping on a detached task
fn scheduler(sender: &mpsc::UnboundedSender<Alarm>) -> impl FnMut(Alarm, Duration) + '_ {
    move |alarm, delay| {
        let sender = sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(alarm);
        });
    }
}

impl<C: BroadcastChannel> Driver<C> {
    /// Wraps a coordinator that publishes through `channel`
    pub fn new(game: Game, channel: C) -> (Self, Handle) {
        let (input_sender, inputs) = mpsc::unbounded_channel();
        let (alarm_sender, alarms) = mpsc::unbounded_channel();
        (
            Self {
                game,
                channel,
                inputs,
                alarms,
                alarm_sender,
            },
            Handle {
                inputs: input_sender,
            },
        )
    }

    /// The wrapped coordinator
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Mutable access for setup such as loading questions or subscribing
    pub fn game_mut(&mut self) -> &mut Game {
        &mut self.game
    }

    /// Announces the client on the channel
    pub fn join(&mut self) {
        self.game
            .join(scheduler(&self.alarm_sender), &self.channel);
    }

    /// Waits for the next input and handles it
    ///
    /// # Returns
    ///
    /// `false` once the client left or every `Handle` was dropped
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            biased;
            Some(alarm) = self.alarms.recv() => {
                self.game
                    .receive_alarm(alarm, scheduler(&self.alarm_sender), &self.channel);
                true
            }
            input = self.inputs.recv() => match input {
                Some(input) => self.handle(input),
                None => {
                    debug!("every handle dropped; stopping");
                    false
                }
            },
        }
    }

    /// Joins the session and runs until the client leaves
    pub async fn run(mut self) {
        self.join();
        while self.step().await {}
    }

    fn handle(&mut self, input: Input) -> bool {
        match input {
            Input::Envelope(text) => match Envelope::from_message(&text) {
                Ok(envelope) => {
                    self.game.receive_envelope(
                        envelope,
                        scheduler(&self.alarm_sender),
                        &self.channel,
                    );
                }
                Err(error) => warn!(%error, "dropping undecodable payload"),
            },
            Input::Action(action, reply) => {
                let outcome =
                    self.game
                        .perform(action, scheduler(&self.alarm_sender), &self.channel);
                if let Err(error) = &outcome {
                    debug!(%error, "action rejected");
                }
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            Input::View(reply) => {
                let _ = reply.send(self.game.view());
            }
            Input::Leave => {
                self.game.leave(&self.channel);
                return false;
            }
        }
        true
    }
}
