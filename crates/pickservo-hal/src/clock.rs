//! Blocking waits.
//!
//! The only waits with physical meaning in the stack are the duration of a
//! timed base motion and the settle delay between observations. Both go
//! through [`Sleeper`] so the simulation can advance its own clock instead of
//! blocking the test thread.

use std::time::Duration;

/// Blocks the calling thread for a duration.
pub trait Sleeper: Send {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleep.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn thread_sleeper_blocks_for_at_least_the_duration() {
        let start = Instant::now();
        ThreadSleeper.sleep(Duration::from_millis(15));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        let start = Instant::now();
        ThreadSleeper.sleep(Duration::ZERO);
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
