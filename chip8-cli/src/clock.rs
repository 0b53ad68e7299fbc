//! Host loop clock.
use std::{
    thread,
    time::{Duration, Instant},
};

use chip8::constants::NANOS_IN_SECOND;

/// Step frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Timer to pace the host loop to a fixed number of VM steps per second.
///
/// When the loop is stalled for longer than a cycle, the clock
/// continues at the next cycle instead of trying to catch up.
pub struct Clock {
    start: Instant,
    interval: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(freq: Hz) -> Self {
        Self {
            start: Instant::now(),
            interval: freq.into(),
        }
    }

    /// A clock with a zero interval never blocks.
    pub fn is_throttled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub fn wait(&mut self) {
        if !self.is_throttled() {
            return;
        }

        while self.start.elapsed() < self.interval {
            // Sleep does not have enough resolution at high frequencies,
            // and spinning causes high CPU usage.
            thread::yield_now();
        }

        self.reset();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);

        let interval: Duration = Hz(0).into();
        assert!(interval.is_zero());
    }

    #[test]
    fn test_clock_wait() {
        let mut clock = Clock::new(Hz(500));
        assert!(clock.is_throttled());

        let start = Instant::now();
        clock.reset();
        clock.wait();
        assert!(start.elapsed() >= Duration::from_millis(2));

        // Unthrottled clock returns immediately.
        let mut clock = Clock::new(Hz(0));
        assert!(!clock.is_throttled());
        clock.wait();
    }
}
