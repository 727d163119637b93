//! Broadcast throttle: coalescing, keep-latest rate limiter.
//!
//! DESIGN
//! ======
//! One `Throttle` guards one ephemeral stream (an object's transform frames,
//! or a user's shape preview). The first offer in an idle window is sent
//! immediately. Offers arriving inside the window replace the pending value
//! (latest wins, nothing queues) and a single trailing flush sends it once
//! the window closes. A send always discards any older pending value, so
//! stale frames never go out after newer ones.
//!
//! The state machine is pure and time-explicit (`offer(value, now)`) so it can
//! be tested without sleeping; `spawn_flush` drives the trailing send on
//! tokio.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

/// Minimum spacing between ephemeral sends (roughly one 60 Hz frame).
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(16);

/// Outcome of offering a value to the throttle.
#[derive(Debug, PartialEq)]
pub enum Offer<T> {
    /// Send this value now.
    Send(T),
    /// Value parked as pending until `flush_at`. `schedule` is true when the
    /// caller must start the trailing flush (none is running yet).
    Deferred { flush_at: Instant, schedule: bool },
}

/// Outcome of a trailing flush attempt.
#[derive(Debug, PartialEq)]
pub enum Flush<T> {
    /// Send this pending value now.
    Send(T),
    /// Nothing pending (already sent or cancelled).
    Idle,
    /// Window still open; try again at the given instant.
    Wait(Instant),
}

#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<T>,
    flush_scheduled: bool,
}

impl<T> Throttle<T> {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self { interval, last_sent: None, pending: None, flush_scheduled: false }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn window_end(&self) -> Option<Instant> {
        self.last_sent.map(|sent| sent + self.interval)
    }

    /// Offer a value at `now`.
    pub fn offer(&mut self, value: T, now: Instant) -> Offer<T> {
        match self.window_end() {
            Some(flush_at) if now < flush_at => {
                self.pending = Some(value);
                let schedule = !self.flush_scheduled;
                self.flush_scheduled = true;
                Offer::Deferred { flush_at, schedule }
            }
            _ => {
                self.pending = None;
                self.last_sent = Some(now);
                Offer::Send(value)
            }
        }
    }

    /// Take the pending value if its window has closed.
    pub fn flush(&mut self, now: Instant) -> Flush<T> {
        if self.pending.is_none() {
            self.flush_scheduled = false;
            return Flush::Idle;
        }
        if let Some(flush_at) = self.window_end() {
            if now < flush_at {
                return Flush::Wait(flush_at);
            }
        }
        self.flush_scheduled = false;
        self.last_sent = Some(now);
        match self.pending.take() {
            Some(value) => Flush::Send(value),
            None => Flush::Idle,
        }
    }

    /// Drop any pending value. A running flush task will find nothing to send.
    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Drive a trailing flush: sleep until `flush_at`, then ask `take` for the
/// pending value and hand it to `send`. `take` usually locks the shared
/// throttle and calls [`Throttle::flush`].
pub fn spawn_flush<T, F, S, Fut>(flush_at: Instant, mut take: F, send: S) -> JoinHandle<()>
where
    T: Send + 'static,
    F: FnMut(Instant) -> Flush<T> + Send + 'static,
    S: FnOnce(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut at = flush_at;
        loop {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
            match take(Instant::now()) {
                Flush::Send(value) => {
                    send(value).await;
                    return;
                }
                Flush::Idle => return,
                Flush::Wait(next) => at = next,
            }
        }
    })
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
