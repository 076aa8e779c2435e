//! Bounded block sequences

use crate::block::{BlockData, BlockError};
use serde::Serialize;

/// Largest program a single transfer can carry.
pub const MAX_BLOCKS: usize = 8;

/// An ordered sequence of at most [`MAX_BLOCKS`] blocks.
///
/// A program is assembled by exactly one owner (a transfer session, the
/// slot reader, a compose request) and handed on by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Program {
    blocks: Vec<BlockData>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a program, rejecting sequences longer than [`MAX_BLOCKS`].
    pub fn from_blocks(blocks: Vec<BlockData>) -> Result<Self, BlockError> {
        if blocks.len() > MAX_BLOCKS {
            return Err(BlockError::ProgramTooLong {
                len: blocks.len(),
                max: MAX_BLOCKS,
            });
        }
        Ok(Self { blocks })
    }

    /// Appends a block.
    pub fn push(&mut self, block: BlockData) -> Result<(), BlockError> {
        if self.blocks.len() >= MAX_BLOCKS {
            return Err(BlockError::ProgramTooLong {
                len: self.blocks.len() + 1,
                max: MAX_BLOCKS,
            });
        }
        self.blocks.push(block);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[BlockData] {
        &self.blocks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlockData> {
        self.blocks.iter()
    }

    pub fn into_blocks(self) -> Vec<BlockData> {
        self.blocks
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a BlockData;
    type IntoIter = std::slice::Iter<'a, BlockData>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.iter()
    }
}
