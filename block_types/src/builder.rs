//! Validating block producer

use crate::block::{BlockData, BlockError, BLOCK_VERSION};
use crate::kind::BlockType;

/// Produces well-formed blocks.
///
/// Serials are `[prefix0, prefix1, counter_hi, counter_lo]`: a two byte
/// device prefix (usually the tail of the producer's hardware address)
/// followed by a counter that increments per block and wraps at 16 bits.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    prefix: [u8; 2],
    counter: u16,
}

impl BlockBuilder {
    pub fn new(prefix: [u8; 2]) -> Self {
        Self { prefix, counter: 0 }
    }

    /// Starts numbering at `counter` instead of zero.
    pub fn with_counter(prefix: [u8; 2], counter: u16) -> Self {
        Self { prefix, counter }
    }

    /// Next counter value that will be stamped.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Builds a block of a known type.
    ///
    /// Names longer than 15 bytes are truncated; an empty name falls back to
    /// the type's label.
    pub fn build(&mut self, kind: BlockType, name: &str) -> BlockData {
        let mut block = BlockData::from_raw_type(kind.as_u8());
        block.version = BLOCK_VERSION;
        block.serial = self.next_serial();
        if name.is_empty() {
            block.set_name(kind.label());
        } else {
            block.set_name(name);
        }
        block.seal();
        block
    }

    /// Builds a block with explicit parameters.
    pub fn build_with_params(
        &mut self,
        kind: BlockType,
        subtype: u8,
        param1: u8,
        param2: u8,
        name: &str,
    ) -> BlockData {
        let mut block = self.build(kind, name);
        block.subtype = subtype;
        block.param1 = param1;
        block.param2 = param2;
        block.seal();
        block
    }

    /// Builds a block from a raw type byte, rejecting unknown opcodes.
    pub fn build_raw(&mut self, type_id: u8, name: &str) -> Result<BlockData, BlockError> {
        let kind = BlockType::from_u8(type_id).ok_or(BlockError::UnknownType(type_id))?;
        Ok(self.build(kind, name))
    }

    fn next_serial(&mut self) -> [u8; 4] {
        let [hi, lo] = self.counter.to_be_bytes();
        self.counter = self.counter.wrapping_add(1);
        [self.prefix[0], self.prefix[1], hi, lo]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_blocks_validate() {
        let mut builder = BlockBuilder::new([0xAB, 0xCD]);
        for kind in BlockType::ALL {
            let block = builder.build(kind, "");
            assert!(block.validate().is_ok(), "{:?}", kind);
            assert_eq!(block.version, BLOCK_VERSION);
        }
    }

    #[test]
    fn test_serial_numbering() {
        let mut builder = BlockBuilder::with_counter([0x12, 0x34], 0x00FF);
        let first = builder.build(BlockType::Forward, "F");
        let second = builder.build(BlockType::Forward, "F");
        assert_eq!(first.serial, [0x12, 0x34, 0x00, 0xFF]);
        assert_eq!(second.serial, [0x12, 0x34, 0x01, 0x00]);
        assert_eq!(builder.counter(), 0x0101);
    }

    #[test]
    fn test_counter_wraps() {
        let mut builder = BlockBuilder::with_counter([0, 0], u16::MAX);
        let block = builder.build(BlockType::Beep, "");
        assert_eq!(block.serial, [0, 0, 0xFF, 0xFF]);
        assert_eq!(builder.counter(), 0);
    }

    #[test]
    fn test_rejects_unknown_raw_type() {
        let mut builder = BlockBuilder::new([0, 0]);
        assert_eq!(
            builder.build_raw(0x92, "x"),
            Err(BlockError::UnknownType(0x92))
        );
        assert_eq!(builder.counter(), 0);
        assert!(builder.build_raw(0x15, "Spin").is_ok());
    }

    #[test]
    fn test_default_name_and_truncation() {
        let mut builder = BlockBuilder::new([0, 0]);
        assert_eq!(builder.build(BlockType::TurnLeft, "").name_str(), "Turn Left");
        assert_eq!(
            builder
                .build(BlockType::Forward, "Forward forever and ever")
                .name_str(),
            "Forward forever"
        );
    }

    #[test]
    fn test_params_are_sealed() {
        let mut builder = BlockBuilder::new([1, 2]);
        let block = builder.build_with_params(BlockType::Repeat, 1, 2, 3, "Loop");
        assert_eq!((block.subtype, block.param1, block.param2), (1, 2, 3));
        assert!(block.checksum_ok());
    }
}
