//! # Button Service
//!
//! Long and short press detection for the single push button.
//!
//! ## Philosophy
//!
//! - **Two observers, one gesture**: The edge interrupt and the task's
//!   periodic poll both watch the button; whichever sees the gesture first
//!   reports it, and the other stays silent
//! - **Requests, not callbacks**: Detection only raises a pending flag; the
//!   task decides what to do with it at its next tick
//! - **Lock-free**: Everything the interrupt touches is an atomic
//!
//! ## Gestures
//!
//! - Held at least `long_press_us`: pairing request (interrupt on release,
//!   or poll while still held)
//! - Released before that: send request (interrupt only, and only when
//!   sending is enabled for this role)

use hal::ButtonDevice;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Gesture timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum hold that counts as a long press.
    pub long_press_us: u64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press_us: 4_000_000,
        }
    }
}

/// State shared between the edge interrupt and the task.
#[derive(Debug)]
pub struct GestureShared {
    long_press_us: u64,
    send_enabled: bool,
    press_started_us: AtomicU64,
    /// Set once the current press has produced a gesture.
    fired: AtomicBool,
    pairing_requested: AtomicBool,
    send_requested: AtomicBool,
}

impl GestureShared {
    /// Edge interrupt entry point.
    ///
    /// `down` is the level after the edge.
    pub fn on_edge(&self, down: bool, now_us: u64) {
        if down {
            self.press_started_us.store(now_us, Ordering::SeqCst);
            self.fired.store(false, Ordering::SeqCst);
            return;
        }

        let held = now_us.saturating_sub(self.press_started_us.load(Ordering::SeqCst));
        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if held >= self.long_press_us {
            self.pairing_requested.store(true, Ordering::SeqCst);
        } else if self.send_enabled {
            self.send_requested.store(true, Ordering::SeqCst);
        }
    }

    fn fire_long_press(&self) -> bool {
        let won = self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if won {
            self.pairing_requested.store(true, Ordering::SeqCst);
        }
        won
    }
}

/// Task-side gesture detector.
///
/// Owns the poll state; hand [`GestureDetector::shared`] to the interrupt.
#[derive(Debug)]
pub struct GestureDetector {
    shared: Arc<GestureShared>,
    was_pressed: bool,
    hold_start_us: u64,
}

impl GestureDetector {
    /// `send_enabled` is true on the board, where a short press sends the
    /// program. The robot ignores short presses.
    pub fn new(config: GestureConfig, send_enabled: bool) -> Self {
        Self {
            shared: Arc::new(GestureShared {
                long_press_us: config.long_press_us,
                send_enabled,
                press_started_us: AtomicU64::new(0),
                fired: AtomicBool::new(true),
                pairing_requested: AtomicBool::new(false),
                send_requested: AtomicBool::new(false),
            }),
            was_pressed: false,
            hold_start_us: 0,
        }
    }

    pub fn shared(&self) -> Arc<GestureShared> {
        self.shared.clone()
    }

    /// Periodic level poll. Returns true if this call raised a pairing
    /// request.
    pub fn poll(&mut self, down: bool, now_us: u64) -> bool {
        if !down {
            self.was_pressed = false;
            return false;
        }
        if !self.was_pressed {
            self.was_pressed = true;
            self.hold_start_us = now_us;
            // A press the interrupt did not see still gets one gesture.
            self.shared.fired.store(false, Ordering::SeqCst);
            return false;
        }
        let held = now_us.saturating_sub(self.hold_start_us);
        held >= self.shared.long_press_us && self.shared.fire_long_press()
    }

    /// Polls a button device directly.
    pub fn poll_device(&mut self, button: &dyn ButtonDevice, now_us: u64) -> bool {
        self.poll(button.is_pressed(), now_us)
    }

    /// Consumes a pending pairing request.
    pub fn take_pairing_request(&self) -> bool {
        self.shared.pairing_requested.swap(false, Ordering::SeqCst)
    }

    /// Consumes a pending send request.
    pub fn take_send_request(&self) -> bool {
        self.shared.send_requested.swap(false, Ordering::SeqCst)
    }

    /// Raises a pairing request without a button, e.g. from a host command.
    pub fn request_pairing(&self) {
        self.shared.pairing_requested.store(true, Ordering::SeqCst);
    }

    /// Raises a send request without a button.
    pub fn request_send(&self) {
        self.shared.send_requested.store(true, Ordering::SeqCst);
    }
}
