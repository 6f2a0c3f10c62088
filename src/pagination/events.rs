//! Cursor lifecycle notifications

use crate::error::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// A notification published by a [`BufferedCursor`](super::BufferedCursor)
#[derive(Debug, Clone)]
pub enum CursorEvent<T> {
    /// An item was handed to the caller
    Data(T),
    /// The result was fully drained; sent once per cursor
    Done,
    /// The cursor was closed
    Close,
    /// An operation failed
    Error(Error),
}

impl<T> CursorEvent<T> {
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Fan-out of events to every live subscriber
///
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub(crate) struct EventHub<T> {
    subscribers: Vec<UnboundedSender<CursorEvent<T>>>,
}

impl<T: Clone> EventHub<T> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self) -> UnboundedReceiver<CursorEvent<T>> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Build and send an event, skipping the work when nobody listens
    pub(crate) fn emit_with(&mut self, make: impl FnOnce() -> CursorEvent<T>) {
        if self.subscribers.is_empty() {
            return;
        }
        let event = make();
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub(crate) fn emit(&mut self, event: CursorEvent<T>) {
        self.emit_with(|| event);
    }
}
