//! Broadcast channel abstraction
//!
//! Clients share no memory; the only link between them is a fan-out bus with
//! at-least-once, unordered delivery. This module defines the seam the
//! coordinator sends through. Implementations might sit on top of a pub/sub
//! service, a WebSocket relay or, in tests, an in-memory queue.

use std::{cell::RefCell, rc::Rc};

use crate::message::Envelope;

/// Trait for publishing envelopes to every client in the session
pub trait BroadcastChannel {
    /// Publishes an envelope to all clients
    ///
    /// Delivery is best effort: the bus may duplicate or reorder envelopes,
    /// and it may or may not echo them back to the sender.
    fn broadcast(&self, envelope: &Envelope);
}

impl<T: BroadcastChannel + ?Sized> BroadcastChannel for &T {
    fn broadcast(&self, envelope: &Envelope) {
        (**self).broadcast(envelope);
    }
}

/// A channel that records every envelope it is asked to send
///
/// Useful for driving a coordinator by hand and inspecting its output.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    sent: Rc<RefCell<Vec<Envelope>>>,
}

impl RecordingChannel {
    /// Removes and returns everything sent so far
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    /// Number of envelopes waiting to be drained
    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    /// Whether nothing is waiting to be drained
    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }
}

impl BroadcastChannel for RecordingChannel {
    fn broadcast(&self, envelope: &Envelope) {
        self.sent.borrow_mut().push(envelope.clone());
    }
}
