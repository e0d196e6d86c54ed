//! Cancellable countdowns
//!
//! Timers never call back into the coordinator on their own. Starting a
//! countdown hands an `Alarm` to the caller's scheduler; when the scheduler
//! delivers it back, `Timers::on_alarm` turns it into a tick or an expiry, or
//! drops it if the countdown was cancelled in the meantime. Each client holds
//! at most one live countdown, so starting a new one cancels the previous
//! one and a stale alarm can never fire a transition twice.

use serde::{Deserialize, Serialize};
use tracing::trace;
use web_time::Duration;

/// Identifies one countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerHandle(u64);

/// What a countdown is counting towards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerPurpose {
    /// Waiting for an existing host to announce itself
    Election,
    /// Time left to answer the current question
    Question,
    /// Pause between the reveal and the leaderboard
    RevealDelay,
    /// Pause on the leaderboard before advancing
    LeaderboardDelay,
}

/// A wake-up request handed to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// The countdown this alarm belongs to
    pub handle: TimerHandle,
}

/// What a delivered alarm means for the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second elapsed and the countdown continues
    Tick {
        /// The countdown's purpose
        purpose: TimerPurpose,
        /// Whole seconds left
        remaining: u64,
    },
    /// The countdown reached zero
    Expired {
        /// The countdown's purpose
        purpose: TimerPurpose,
    },
}

/// A running countdown
#[derive(Debug, Clone, Copy)]
struct Countdown {
    handle: TimerHandle,
    purpose: TimerPurpose,
    remaining: u64,
}

/// The per-client timer slot
#[derive(Debug, Default)]
pub struct Timers {
    /// Next handle to hand out
    next: u64,
    /// The live countdown, if any
    active: Option<Countdown>,
}

impl Timers {
    /// Starts a countdown, cancelling whichever one was running
    ///
    /// A zero-second countdown expires on its first alarm.
    pub fn start_countdown<S: FnMut(Alarm, Duration)>(
        &mut self,
        seconds: u64,
        purpose: TimerPurpose,
        mut schedule_message: S,
    ) -> TimerHandle {
        if let Some(previous) = self.active.take() {
            trace!(?previous.purpose, "replacing running countdown");
        }

        let handle = TimerHandle(self.next);
        self.next += 1;
        self.active = Some(Countdown {
            handle,
            purpose,
            remaining: seconds,
        });

        let first_wake = if seconds == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1)
        };
        schedule_message(Alarm { handle }, first_wake);

        handle
    }

    /// Cancels a countdown
    ///
    /// Cancelling a handle that already fired or was already cancelled does
    /// nothing.
    ///
    /// # Returns
    ///
    /// `true` if a live countdown was stopped
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.active {
            Some(countdown) if countdown.handle == handle => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    /// Cancels whatever countdown is running
    pub fn cancel_all(&mut self) {
        self.active = None;
    }

    /// Handle of the live countdown
    pub fn active(&self) -> Option<TimerHandle> {
        self.active.map(|c| c.handle)
    }

    /// Purpose of the live countdown
    pub fn purpose(&self) -> Option<TimerPurpose> {
        self.active.map(|c| c.purpose)
    }

    /// Seconds left on the live countdown
    pub fn remaining(&self) -> Option<u64> {
        self.active.map(|c| c.remaining)
    }

    /// Processes a delivered alarm
    ///
    /// # Returns
    ///
    /// The tick or expiry the alarm stands for, or `None` if the alarm
    /// belongs to a countdown that is no longer live
    pub fn on_alarm<S: FnMut(Alarm, Duration)>(
        &mut self,
        alarm: Alarm,
        mut schedule_message: S,
    ) -> Option<TimerEvent> {
        let Some(countdown) = self.active.as_mut() else {
            trace!(?alarm, "dropping alarm with no live countdown");
            return None;
        };
        if countdown.handle != alarm.handle {
            trace!(?alarm, "dropping stale alarm");
            return None;
        }

        countdown.remaining = countdown.remaining.saturating_sub(1);
        let purpose = countdown.purpose;

        if countdown.remaining == 0 {
            self.active = None;
            Some(TimerEvent::Expired { purpose })
        } else {
            let remaining = countdown.remaining;
            schedule_message(alarm, Duration::from_secs(1));
            Some(TimerEvent::Tick { purpose, remaining })
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_countdown_ticks_then_expires() {
        let mut timers = Timers::default();
        let mut scheduled = Vec::new();
        let handle = timers.start_countdown(3, TimerPurpose::Question, |a, d| {
            scheduled.push((a, d));
        });
        assert_eq!(scheduled, vec![(Alarm { handle }, Duration::from_secs(1))]);

        let alarm = Alarm { handle };
        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(timers.on_alarm(alarm, |_, _| {}));
        }

        assert_eq!(
            events,
            vec![
                Some(TimerEvent::Tick {
                    purpose: TimerPurpose::Question,
                    remaining: 2
                }),
                Some(TimerEvent::Tick {
                    purpose: TimerPurpose::Question,
                    remaining: 1
                }),
                Some(TimerEvent::Expired {
                    purpose: TimerPurpose::Question
                }),
            ]
        );
        assert_eq!(timers.active(), None);
        assert_eq!(timers.on_alarm(alarm, |_, _| {}), None);
    }

    #[test]
    fn test_zero_second_countdown_expires_on_first_alarm() {
        let mut timers = Timers::default();
        let mut wake = None;
        let handle = timers.start_countdown(0, TimerPurpose::RevealDelay, |_, d| wake = Some(d));
        assert_eq!(wake, Some(Duration::ZERO));
        assert_eq!(
            timers.on_alarm(Alarm { handle }, |_, _| {}),
            Some(TimerEvent::Expired {
                purpose: TimerPurpose::RevealDelay
            })
        );
    }

    #[test]
    fn test_cancel_then_expire_produces_nothing() {
        let mut timers = Timers::default();
        let handle = timers.start_countdown(1, TimerPurpose::Question, |_, _| {});

        assert!(timers.cancel(handle));
        assert_eq!(timers.on_alarm(Alarm { handle }, |_, _| {}), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut timers = Timers::default();
        let handle = timers.start_countdown(1, TimerPurpose::Question, |_, _| {});

        assert!(timers.cancel(handle));
        assert!(!timers.cancel(handle));

        let fired = timers.start_countdown(1, TimerPurpose::Question, |_, _| {});
        timers.on_alarm(Alarm { handle: fired }, |_, _| {});
        assert!(!timers.cancel(fired));
    }

    #[test]
    fn test_new_countdown_replaces_old_one() {
        let mut timers = Timers::default();
        let first = timers.start_countdown(5, TimerPurpose::Question, |_, _| {});
        let second = timers.start_countdown(2, TimerPurpose::RevealDelay, |_, _| {});

        assert_ne!(first, second);
        assert_eq!(timers.active(), Some(second));
        assert_eq!(timers.on_alarm(Alarm { handle: first }, |_, _| {}), None);
        assert_eq!(timers.remaining(), Some(2));
        assert_eq!(timers.purpose(), Some(TimerPurpose::RevealDelay));
    }

    #[test]
    fn test_cancel_all() {
        let mut timers = Timers::default();
        let handle = timers.start_countdown(5, TimerPurpose::LeaderboardDelay, |_, _| {});
        timers.cancel_all();
        assert_eq!(timers.active(), None);
        assert_eq!(timers.on_alarm(Alarm { handle }, |_, _| {}), None);
    }
}
