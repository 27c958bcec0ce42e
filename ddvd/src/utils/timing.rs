//! Timing utilities for the playback loop.
//!
//! Provides a millisecond clock abstraction and one-shot deadlines used
//! for still-frame waits, subtitle display durations, trick-mode seek
//! intervals and periodic time updates.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Trait providing a monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

impl<C: Clock + ?Sized> Clock for Box<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock advanced explicitly by the caller.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// One-shot deadline in clock milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<u64>,
}

impl Deadline {
    pub fn arm(&mut self, now: u64, after_ms: u64) {
        self.at = Some(now.saturating_add(after_ms));
    }

    pub fn cancel(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    /// Disarms and returns `true` once `now` has reached the deadline.
    pub fn fire(&mut self, now: u64) -> bool {
        match self.at {
            Some(at) if now >= at => {
                self.at = None;
                true
            }
            _ => false,
        }
    }
}

#[test]
fn deadline_fires_once() {
    let clock = ManualClock::new(1000);
    let mut deadline = Deadline::default();
    assert!(!deadline.fire(clock.now_ms()));

    deadline.arm(clock.now_ms(), 300);
    clock.advance(299);
    assert!(!deadline.fire(clock.now_ms()));
    clock.advance(1);
    assert!(deadline.fire(clock.now_ms()));
    assert!(!deadline.is_armed());
    assert!(!deadline.fire(clock.now_ms()));
}
