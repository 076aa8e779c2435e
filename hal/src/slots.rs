//! Removable block slots on the board

use block_types::BlockData;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {0} does not exist")]
    OutOfRange(usize),

    #[error("no block in slot {0}")]
    Empty(usize),

    #[error("read of slot {slot} failed: {reason}")]
    ReadFailed { slot: usize, reason: String },
}

/// Reads 32-byte block records from physical slots.
pub trait BlockReader: Send {
    fn slot_count(&self) -> usize;

    /// Presence detection, independent of whether the record is readable.
    fn is_present(&mut self, slot: usize) -> bool;

    /// Reads the raw record. No checksum validation happens here.
    fn read(&mut self, slot: usize) -> Result<BlockData, SlotError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::BlockType;

    struct FakeSlots([Option<BlockData>; 2]);

    impl BlockReader for FakeSlots {
        fn slot_count(&self) -> usize {
            self.0.len()
        }

        fn is_present(&mut self, slot: usize) -> bool {
            matches!(self.0.get(slot), Some(Some(_)))
        }

        fn read(&mut self, slot: usize) -> Result<BlockData, SlotError> {
            match self.0.get(slot) {
                None => Err(SlotError::OutOfRange(slot)),
                Some(None) => Err(SlotError::Empty(slot)),
                Some(Some(block)) => Ok(*block),
            }
        }
    }

    #[test]
    fn test_read_slots() {
        let mut slots = FakeSlots([Some(BlockData::new(BlockType::Forward)), None]);
        assert!(slots.is_present(0));
        assert!(!slots.is_present(1));
        assert_eq!(slots.read(1), Err(SlotError::Empty(1)));
        assert_eq!(slots.read(5), Err(SlotError::OutOfRange(5)));
        assert_eq!(slots.read(0).unwrap().kind(), Some(BlockType::Forward));
    }
}
