//! CPU Clock.
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::constants::*;

/// Timer to synchronize a thread with a software clock.
///
/// When the owner is paused, for example while single stepping in
/// the debugger, time elapses until it is resumed. Rather than trying
/// to catch up on missed cycles, the clock simply continues at its
/// usual rate.
pub(crate) struct Clock {
    interval: Duration,
    last: Instant,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Clock that fires at the 60Hz rate of the delay and sound timers.
    pub(crate) fn timer() -> Self {
        Self::new(Duration::from_nanos(CLOCK_CYCLE_TIME))
    }

    /// Set the clock state back to zero.
    pub(crate) fn reset(&mut self) {
        self.last = Instant::now()
    }

    /// Time left until the next cycle.
    pub(crate) fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.last.elapsed())
    }

    /// Block the current thread until the next clock cycle.
    ///
    /// A zero interval never blocks.
    pub(crate) fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        loop {
            let remaining = self.remaining();
            if remaining.is_zero() {
                self.reset();
                return;
            }

            // Sleep does not have enough resolution for short intervals,
            // so only the bulk of the wait is slept and the rest is yielded.
            if remaining > Duration::from_millis(2) {
                thread::sleep(remaining - Duration::from_millis(1));
            } else {
                thread::yield_now();
            }
        }
    }
}
