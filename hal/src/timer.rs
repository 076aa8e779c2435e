//! # Timer Device
//!
//! Monotonic time and blocking delays.
//!
//! ## Philosophy
//!
//! **Time is a service, not a global variable.**
//!
//! Pairing timeouts, broadcast intervals and gesture thresholds are all
//! checked against [`TimerDevice::now_micros`] at each tick. There is no
//! timer interrupt driving the protocol.
//!
//! ## Design Principles
//!
//! 1. **Monotonic**: Time never goes backwards
//! 2. **Non-blocking reads**: `now_micros` always returns immediately
//! 3. **Blocking waits are separate**: Only [`Delay`] sleeps

/// Monotonic microsecond clock since boot.
pub trait TimerDevice: Send + Sync {
    fn now_micros(&self) -> u64;

    fn now_ms(&self) -> u64 {
        self.now_micros() / 1_000
    }
}

/// Blocking, non-cancellable sleep.
///
/// The interpreter occupies its context for the real duration of each
/// action through this trait.
pub trait Delay: Send + Sync {
    fn delay_ms(&self, ms: u64);
}
