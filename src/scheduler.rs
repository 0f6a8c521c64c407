//! Debounced recompute scheduling.
//!
//! Camera drags emit dozens of viewport events per second. The scheduler
//! keeps only the latest trigger and releases it once no new trigger has
//! arrived for a quiescence window. Every `schedule` call cancels the pending
//! deadline and restarts it.
//!
//! The scheduler is a plain state machine driven by a [`Clock`]; it never
//! sleeps. The cluster layer's worker thread waits on
//! [`UpdateScheduler::time_until_due`], while tests drive a [`ManualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Reference quiescence window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug)]
struct Pending<T> {
    trigger: T,
    deadline: Instant,
}

/// Cancel-and-restart debounce timer holding the latest trigger.
#[derive(Debug)]
pub struct UpdateScheduler<T, C: Clock = SystemClock> {
    window: Duration,
    clock: C,
    pending: Option<Pending<T>>,
    coalesced: u64,
}

impl<T> UpdateScheduler<T, SystemClock> {
    /// Scheduler on the wall clock.
    pub fn new(window: Duration) -> Self {
        Self::with_clock(window, SystemClock)
    }
}

impl<T, C: Clock> UpdateScheduler<T, C> {
    pub fn with_clock(window: Duration, clock: C) -> Self {
        Self {
            window,
            clock,
            pending: None,
            coalesced: 0,
        }
    }

    /// Change the window. A pending deadline keeps its old value.
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// Replace any pending trigger and restart the timer.
    ///
    /// Returns `true` if a pending trigger was superseded.
    pub fn schedule(&mut self, trigger: T) -> bool {
        let deadline = self.clock.now() + self.window;
        let superseded = self.pending.replace(Pending { trigger, deadline }).is_some();
        if superseded {
            self.coalesced += 1;
        }
        superseded
    }

    /// Take the trigger if its deadline has passed.
    pub fn poll(&mut self) -> Option<T> {
        if self.is_due() {
            self.pending.take().map(|p| p.trigger)
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_due(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| self.clock.now() >= p.deadline)
    }

    /// How long until the pending trigger is due, `None` if nothing is pending.
    pub fn time_until_due(&self) -> Option<Duration> {
        self.pending
            .as_ref()
            .map(|p| p.deadline.saturating_duration_since(self.clock.now()))
    }

    /// Drop the pending trigger, if any.
    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|p| p.trigger)
    }

    /// Number of triggers superseded before they became due.
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> (UpdateScheduler<u32, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            UpdateScheduler::with_clock(Duration::from_millis(300), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_fires_after_window() {
        let (mut s, clock) = scheduler();
        assert!(!s.schedule(1));
        assert_eq!(s.poll(), None);

        clock.advance(Duration::from_millis(299));
        assert_eq!(s.poll(), None);
        assert_eq!(s.time_until_due(), Some(Duration::from_millis(1)));

        clock.advance(Duration::from_millis(1));
        assert_eq!(s.poll(), Some(1));
        assert!(!s.is_pending());
        assert_eq!(s.poll(), None);
    }

    #[test]
    fn test_each_trigger_restarts_the_timer() {
        let (mut s, clock) = scheduler();
        s.schedule(1);
        for trigger in 2..=10 {
            clock.advance(Duration::from_millis(200));
            assert!(s.schedule(trigger));
            assert_eq!(s.poll(), None);
        }

        clock.advance(Duration::from_millis(300));
        assert_eq!(s.poll(), Some(10));
        assert_eq!(s.coalesced_count(), 9);
    }

    #[test]
    fn test_cancel() {
        let (mut s, clock) = scheduler();
        s.schedule(7);
        assert_eq!(s.cancel(), Some(7));
        clock.advance(Duration::from_secs(1));
        assert_eq!(s.poll(), None);
        assert_eq!(s.time_until_due(), None);
    }

    #[test]
    fn test_zero_window_is_immediately_due() {
        let mut s = UpdateScheduler::new(Duration::ZERO);
        s.schedule("now");
        assert!(s.is_due());
        assert_eq!(s.time_until_due(), Some(Duration::ZERO));
        assert_eq!(s.poll(), Some("now"));
    }

    #[test]
    fn test_independent_schedulers_do_not_interfere() {
        let clock = ManualClock::new();
        let mut a = UpdateScheduler::with_clock(Duration::from_millis(100), clock.clone());
        let mut b = UpdateScheduler::with_clock(Duration::from_millis(500), clock.clone());
        a.schedule("a");
        b.schedule("b");

        clock.advance(Duration::from_millis(100));
        assert_eq!(a.poll(), Some("a"));
        assert_eq!(b.poll(), None);

        clock.advance(Duration::from_millis(400));
        assert_eq!(b.poll(), Some("b"));
    }
}
