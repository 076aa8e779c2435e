//! # Pairing Service
//!
//! Establishes, persists and tears down the one-to-one link between a board
//! and a robot.
//!
//! ## Philosophy
//!
//! - **Mutual consent**: A responder only answers pair requests while its own
//!   user has put it into pairing mode
//! - **One peer**: Entering pairing mode always forgets the old peer first,
//!   telling it so on a best-effort basis
//! - **Split contexts**: The radio callback only flips atomics and answers on
//!   the air; persistent storage is touched exclusively from the task tick
//! - **Clock driven**: Timeouts and broadcast intervals are checked against
//!   the monotonic clock at each tick, never by timers
//!
//! ## Roles
//!
//! - [`PairingRole::Initiator`] (board): broadcasts `PairRequest` every
//!   `broadcast_interval_ms` and waits for a `PairAck`
//! - [`PairingRole::Responder`] (robot): listens; the first `PairRequest`
//!   while active is answered with a `PairAck` and ends the session

pub mod feedback;
pub mod link;
pub mod machine;
pub mod shared;

pub use feedback::{EyesIndicator, LedIndicator, PairingFeedback};
pub use link::PairingLink;
pub use machine::{PairingEvent, PairingStateMachine};
pub use shared::{AtomicPeer, PairingShared};

use serde::{Deserialize, Serialize};

/// Which side of the handshake this node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingRole {
    Initiator,
    Responder,
}

/// Pairing timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Give up after this long without success.
    pub timeout_ms: u64,
    /// Initiator pair request interval.
    pub broadcast_interval_ms: u64,
    /// LED blink period while pairing; on for the first half.
    pub blink_period_ms: u64,
    /// Interval between "still pairing" log lines.
    pub progress_log_interval_ms: u64,
    /// Pause after notifying the old peer, before forgetting it.
    pub unpair_grace_ms: u64,
    /// Robot eyes alternate expression at this interval while pairing.
    pub eye_toggle_interval_ms: u64,
    /// How long the robot looks happy after pairing.
    pub success_display_ms: u64,
    /// How long the robot looks sad after a timeout.
    pub timeout_display_ms: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            broadcast_interval_ms: 500,
            blink_period_ms: 500,
            progress_log_interval_ms: 5_000,
            unpair_grace_ms: 50,
            eye_toggle_interval_ms: 500,
            success_display_ms: 2_000,
            timeout_display_ms: 2_000,
        }
    }
}
