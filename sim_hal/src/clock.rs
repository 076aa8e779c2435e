//! # Simulated Clock
//!
//! Deterministic time shared by every device in a scenario.
//!
//! ## Philosophy
//!
//! **Determinism enables thorough testing.**
//!
//! The clock only advances when told to. A blocking [`Delay`] on the
//! simulated clock advances it instead of sleeping, so a thirty second
//! interpreter run finishes instantly and reports exactly thirty seconds.

use hal::{Delay, TimerDevice};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared virtual microsecond clock.
///
/// Clones observe and advance the same time.
///
/// ```
/// use sim_hal::SimClock;
/// use hal::{Delay, TimerDevice};
///
/// let clock = SimClock::new();
/// clock.advance_ms(100);
/// clock.delay_ms(50);
/// assert_eq!(clock.now_ms(), 150);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    micros: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_ms(ms: u64) -> Self {
        let clock = Self::new();
        clock.advance_ms(ms);
        clock
    }

    pub fn advance_micros(&self, delta: u64) {
        // Saturate rather than wrap so time stays monotonic.
        let _ = self
            .micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| {
                Some(now.saturating_add(delta))
            });
    }

    pub fn advance_ms(&self, delta: u64) {
        self.advance_micros(delta.saturating_mul(1_000));
    }

    /// Moves the clock forward to `micros`. Earlier values are ignored.
    pub fn set_micros(&self, micros: u64) {
        self.micros.fetch_max(micros, Ordering::SeqCst);
    }
}

impl TimerDevice for SimClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}

impl Delay for SimClock {
    fn delay_ms(&self, ms: u64) {
        self.advance_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_time() {
        let clock = SimClock::new();
        let other = clock.clone();
        clock.advance_ms(5);
        assert_eq!(other.now_micros(), 5_000);
    }

    #[test]
    fn test_set_never_goes_backwards() {
        let clock = SimClock::with_initial_ms(10);
        clock.set_micros(5_000);
        assert_eq!(clock.now_ms(), 10);
        clock.set_micros(20_000);
        assert_eq!(clock.now_ms(), 20);
    }

    #[test]
    fn test_saturates() {
        let clock = SimClock::new();
        clock.set_micros(u64::MAX - 1);
        clock.advance_micros(10);
        assert_eq!(clock.now_micros(), u64::MAX);
    }
}
