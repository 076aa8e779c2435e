//! # Link Protocol
//!
//! This crate defines the datagrams exchanged between a board and a robot.
//!
//! ## Philosophy
//!
//! - **One tag byte, fixed bodies**: Every message is a leading tag followed
//!   by a body whose length the tag determines
//! - **Exhaustive**: Messages are an enum; adding one is a compile error
//!   everywhere it is not handled
//! - **Fire-and-forget**: Nothing here implies delivery or ordering
//!
//! ## Wire format
//!
//! | Message | Tag | Body |
//! |---|---|---|
//! | TransferStart | 0x01 | count:u8 |
//! | BlockData | 0x02 | index:u8, record:32 bytes |
//! | TransferEnd | 0x03 | |
//! | TransferAck | 0x04 | count:u8 |
//! | PairRequest | 0x10 | address:6 bytes |
//! | PairAck | 0x11 | address:6 bytes |
//! | Unpair | 0x12 | |

pub mod address;
pub mod message;

pub use address::MacAddress;
pub use message::{DecodeError, LinkMessage, MessageTag, MAX_PAYLOAD_LEN};
