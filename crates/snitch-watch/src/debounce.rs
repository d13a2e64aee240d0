use std::time::Duration;

use tokio::time::Instant;

/// Collapses a burst into its last item. The item is released once nothing
/// new has arrived for `window`; everything pushed before it is discarded.
///
/// Time is passed in by the caller, so the state machine is driven the same
/// way by the watch loop and by tests.
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Replace whatever is pending and restart the quiet period.
    pub fn push(&mut self, now: Instant, item: T) {
        self.pending = Some((now, item));
    }

    /// When the pending item becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at + self.window)
    }

    /// Release the pending item if its quiet period is over.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(due) if due <= now => self.pending.take().map(|(_, item)| item),
            _ => None,
        }
    }

    /// Release the pending item regardless of time.
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(_, item)| item)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
