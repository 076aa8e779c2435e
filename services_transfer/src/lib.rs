//! # Program Transfer
//!
//! Moves a [`Program`](block_types::Program) from the board to the robot as a
//! `TransferStart`, `BlockData`..., `TransferEnd` burst.
//!
//! ## Philosophy
//!
//! - **Fire and forget**: The sender paces its messages and never retries;
//!   the receiver's `TransferAck` is informational only
//! - **All or nothing**: A transfer that ends short is discarded whole, never
//!   executed in part
//! - **Positional writes**: Blocks land at their index, so a duplicate
//!   overwrites instead of appending
//! - **One pending program**: Completed programs go through a single-slot
//!   hand-off; a newer one replaces an unconsumed older one

pub mod receiver;
pub mod sender;
pub mod session;
pub mod slot;

pub use receiver::TransferReceiver;
pub use sender::{ProgramSender, SendReport, TransferError};
pub use session::{SessionOutcome, TransferSession};
pub use slot::ProgramSlot;

use serde::{Deserialize, Serialize};

/// How the receiver decides a transfer is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivedCounting {
    /// Every accepted `BlockData` message counts, duplicates included.
    #[default]
    MessagesAccepted,
    /// Only distinct filled indices count.
    DistinctSlots,
}

/// Transfer timing and completion policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Pause after `TransferStart` and after every `BlockData`.
    pub inter_message_delay_ms: u64,
    pub counting: ReceivedCounting,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            inter_message_delay_ms: 20,
            counting: ReceivedCounting::MessagesAccepted,
        }
    }
}
