use std::time::Duration;

use tokio::time::Instant;

/// Trailing-edge rate limiter.
///
/// The first call after an idle period opens a window of `interval`; when the
/// window closes the limiter releases the latest call's argument exactly once.
/// Calls inside an open window only replace the argument. Consecutive
/// releases are therefore at least `interval` apart, and no burst is lost.
#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    window_end: Option<Instant>,
    pending: Option<T>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_end: None,
            pending: None,
        }
    }

    pub fn call(&mut self, now: Instant, arg: T) {
        self.pending = Some(arg);
        if self.window_end.is_none() {
            self.window_end = Some(now + self.interval);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.window_end
    }

    /// Release the latest argument if the window has closed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.window_end {
            Some(end) if end <= now => {
                self.window_end = None;
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Release the latest argument regardless of time.
    pub fn flush(&mut self) -> Option<T> {
        self.window_end = None;
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
