//! User-visible pairing feedback
//!
//! The state machine reports what it is doing through [`PairingFeedback`];
//! the board drives its LED from that, the robot drives its LED and eyes.

use crate::PairingConfig;
use hal::{Expression, EyesDisplay, StatusLed};
use link_protocol::MacAddress;
use std::sync::Arc;

pub const LED_PAIRING: (u8, u8, u8) = (0, 0, 32);
pub const LED_PAIRED: (u8, u8, u8) = (0, 16, 0);
pub const LED_UNPAIRED: (u8, u8, u8) = (16, 0, 0);

/// Hooks invoked from the pairing tick. All default to doing nothing.
pub trait PairingFeedback {
    fn started(&mut self, _now_us: u64) {}

    fn progress(&mut self, _now_us: u64, _elapsed_ms: u64) {}

    fn succeeded(&mut self, _now_us: u64, _peer: MacAddress) {}

    fn timed_out(&mut self, _now_us: u64) {}

    /// Called on every tick while not pairing.
    fn idle(&mut self, _now_us: u64, _paired: bool) {}
}

impl PairingFeedback for () {}

impl<A: PairingFeedback, B: PairingFeedback> PairingFeedback for (A, B) {
    fn started(&mut self, now_us: u64) {
        self.0.started(now_us);
        self.1.started(now_us);
    }

    fn progress(&mut self, now_us: u64, elapsed_ms: u64) {
        self.0.progress(now_us, elapsed_ms);
        self.1.progress(now_us, elapsed_ms);
    }

    fn succeeded(&mut self, now_us: u64, peer: MacAddress) {
        self.0.succeeded(now_us, peer);
        self.1.succeeded(now_us, peer);
    }

    fn timed_out(&mut self, now_us: u64) {
        self.0.timed_out(now_us);
        self.1.timed_out(now_us);
    }

    fn idle(&mut self, now_us: u64, paired: bool) {
        self.0.idle(now_us, paired);
        self.1.idle(now_us, paired);
    }
}

/// Status LED: blinking blue while pairing, then solid green (paired) or
/// red (unpaired). Only writes the LED when the wanted state changes.
pub struct LedIndicator<L: StatusLed> {
    led: L,
    blink_period_ms: u64,
    blink_on: bool,
    shown_paired: Option<bool>,
}

impl<L: StatusLed> LedIndicator<L> {
    pub fn new(led: L, config: &PairingConfig) -> Self {
        Self {
            led,
            blink_period_ms: config.blink_period_ms.max(1),
            blink_on: false,
            shown_paired: None,
        }
    }

    pub fn led(&self) -> &L {
        &self.led
    }
}

impl<L: StatusLed> PairingFeedback for LedIndicator<L> {
    fn started(&mut self, _now_us: u64) {
        self.blink_on = false;
        self.shown_paired = None;
    }

    fn progress(&mut self, now_us: u64, _elapsed_ms: u64) {
        let phase = (now_us / 1_000) % self.blink_period_ms;
        let want_on = phase < self.blink_period_ms / 2;
        if want_on == self.blink_on {
            return;
        }
        self.blink_on = want_on;
        if want_on {
            let (r, g, b) = LED_PAIRING;
            self.led.set(r, g, b);
        } else {
            self.led.off();
        }
    }

    fn idle(&mut self, _now_us: u64, paired: bool) {
        if self.shown_paired == Some(paired) {
            return;
        }
        self.shown_paired = Some(paired);
        let (r, g, b) = if paired { LED_PAIRED } else { LED_UNPAIRED };
        self.led.set(r, g, b);
    }
}

/// Robot eyes: surprised on entry, alternating with normal while pairing,
/// happy after success and sad after a timeout, each for a while.
pub struct EyesIndicator {
    eyes: Arc<dyn EyesDisplay>,
    toggle_interval_ms: u64,
    success_display_ms: u64,
    timeout_display_ms: u64,
    toggled: bool,
    last_toggle_us: u64,
    revert_at_us: Option<u64>,
}

impl EyesIndicator {
    pub fn new(eyes: Arc<dyn EyesDisplay>, config: &PairingConfig) -> Self {
        Self {
            eyes,
            toggle_interval_ms: config.eye_toggle_interval_ms,
            success_display_ms: config.success_display_ms,
            timeout_display_ms: config.timeout_display_ms,
            toggled: false,
            last_toggle_us: 0,
            revert_at_us: None,
        }
    }

    fn hold(&mut self, expression: Expression, now_us: u64, hold_ms: u64) {
        self.eyes.set_expression(expression);
        self.revert_at_us = Some(now_us + hold_ms * 1_000);
    }
}

impl PairingFeedback for EyesIndicator {
    fn started(&mut self, now_us: u64) {
        self.toggled = false;
        self.last_toggle_us = now_us;
        self.revert_at_us = None;
        self.eyes.set_expression(Expression::Surprised);
    }

    fn progress(&mut self, now_us: u64, _elapsed_ms: u64) {
        if now_us.saturating_sub(self.last_toggle_us) / 1_000 < self.toggle_interval_ms {
            return;
        }
        self.last_toggle_us = now_us;
        self.toggled = !self.toggled;
        self.eyes.set_expression(if self.toggled {
            Expression::Normal
        } else {
            Expression::Surprised
        });
    }

    fn succeeded(&mut self, now_us: u64, _peer: MacAddress) {
        self.hold(Expression::Happy, now_us, self.success_display_ms);
    }

    fn timed_out(&mut self, now_us: u64) {
        self.hold(Expression::Sad, now_us, self.timeout_display_ms);
    }

    fn idle(&mut self, now_us: u64, _paired: bool) {
        if let Some(at) = self.revert_at_us {
            if now_us >= at {
                self.revert_at_us = None;
                self.eyes.set_expression(Expression::Normal);
            }
        }
    }
}
