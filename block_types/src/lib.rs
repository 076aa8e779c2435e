//! # Block Types
//!
//! This crate defines the instruction records exchanged between a board and a
//! robot.
//!
//! ## Philosophy
//!
//! - **Fixed layout**: A block is exactly 32 bytes on the wire and on storage
//! - **Closed opcode set**: Block kinds are an exhaustive enum, not magic numbers
//! - **Tolerant reader, strict writer**: Unknown opcodes decode fine and are
//!   skipped by the interpreter, but the builder refuses to produce them
//!
//! ## Key Types
//!
//! - [`BlockData`]: One 32-byte instruction record
//! - [`BlockType`]: The closed set of known opcodes
//! - [`Program`]: An ordered, bounded sequence of blocks
//! - [`BlockBuilder`]: Validating producer that stamps serials and checksums

pub mod block;
pub mod builder;
pub mod kind;
pub mod program;

pub use block::{BlockData, BlockError, BLOCK_DATA_SIZE, BLOCK_NAME_MAX_LEN, BLOCK_VERSION};
pub use builder::BlockBuilder;
pub use kind::{BlockCategory, BlockType};
pub use program::{Program, MAX_BLOCKS};
