//! The 32-byte instruction record

use crate::kind::BlockType;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Size of one encoded block.
pub const BLOCK_DATA_SIZE: usize = 32;

/// Format tag stamped into every block produced by this crate.
pub const BLOCK_VERSION: u8 = 0x01;

/// Longest name that fits, leaving room for the terminating NUL.
pub const BLOCK_NAME_MAX_LEN: usize = 15;

const NAME_FIELD_LEN: usize = 16;
const CHECKSUM_OFFSET: usize = 9;

/// Errors produced while decoding, validating or building blocks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block record must be {BLOCK_DATA_SIZE} bytes, got {0}")]
    BadLength(usize),

    #[error("checksum mismatch: stored 0x{stored:02X}, computed 0x{computed:02X}")]
    ChecksumMismatch { stored: u8, computed: u8 },

    #[error("unknown block type 0x{0:02X}")]
    UnknownType(u8),

    #[error("block name is {0} bytes, at most {BLOCK_NAME_MAX_LEN} allowed")]
    NameTooLong(usize),

    #[error("program has {len} blocks, at most {max} allowed")]
    ProgramTooLong { len: usize, max: usize },
}

/// One instruction record.
///
/// Layout (little-endian where it matters):
///
/// | offset | field |
/// |---|---|
/// | 0x00 | type |
/// | 0x01 | subtype |
/// | 0x02 | param1 |
/// | 0x03 | param2 |
/// | 0x04..0x08 | serial |
/// | 0x08 | version |
/// | 0x09 | checksum (XOR of bytes 0x00..=0x08) |
/// | 0x0A..0x10 | reserved |
/// | 0x10..0x20 | name, NUL padded |
///
/// The type byte is kept raw so that records carrying opcodes this build does
/// not know still decode; use [`BlockData::kind`] to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockData {
    pub type_id: u8,
    pub subtype: u8,
    pub param1: u8,
    pub param2: u8,
    pub serial: [u8; 4],
    pub version: u8,
    pub checksum: u8,
    pub reserved: [u8; 6],
    pub name: [u8; NAME_FIELD_LEN],
}

const _: () = assert!(std::mem::size_of::<BlockData>() == BLOCK_DATA_SIZE);

impl BlockData {
    /// Creates a zeroed record of the given type with a valid checksum.
    pub fn new(kind: BlockType) -> Self {
        let mut block = Self::from_raw_type(kind.as_u8());
        block.version = BLOCK_VERSION;
        block.seal();
        block
    }

    /// Creates a zeroed record carrying an arbitrary type byte.
    ///
    /// The checksum is left at zero; call [`BlockData::seal`] when the record
    /// should validate.
    pub fn from_raw_type(type_id: u8) -> Self {
        Self {
            type_id,
            subtype: 0,
            param1: 0,
            param2: 0,
            serial: [0; 4],
            version: 0,
            checksum: 0,
            reserved: [0; 6],
            name: [0; NAME_FIELD_LEN],
        }
    }

    /// Decodes a record from exactly 32 bytes.
    ///
    /// No validation happens here; a corrupted record decodes and can be
    /// checked afterwards with [`BlockData::validate`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BlockError> {
        let bytes: &[u8; BLOCK_DATA_SIZE] = bytes
            .try_into()
            .map_err(|_| BlockError::BadLength(bytes.len()))?;
        Ok(Self::from_array(bytes))
    }

    /// Decodes a record from a fixed-size buffer.
    pub fn from_array(bytes: &[u8; BLOCK_DATA_SIZE]) -> Self {
        let mut serial = [0u8; 4];
        serial.copy_from_slice(&bytes[0x04..0x08]);
        let mut reserved = [0u8; 6];
        reserved.copy_from_slice(&bytes[0x0A..0x10]);
        let mut name = [0u8; NAME_FIELD_LEN];
        name.copy_from_slice(&bytes[0x10..0x20]);

        Self {
            type_id: bytes[0x00],
            subtype: bytes[0x01],
            param1: bytes[0x02],
            param2: bytes[0x03],
            serial,
            version: bytes[0x08],
            checksum: bytes[CHECKSUM_OFFSET],
            reserved,
            name,
        }
    }

    /// Encodes the record into its 32-byte wire form.
    pub fn to_bytes(&self) -> [u8; BLOCK_DATA_SIZE] {
        let mut out = [0u8; BLOCK_DATA_SIZE];
        out[0x00] = self.type_id;
        out[0x01] = self.subtype;
        out[0x02] = self.param1;
        out[0x03] = self.param2;
        out[0x04..0x08].copy_from_slice(&self.serial);
        out[0x08] = self.version;
        out[CHECKSUM_OFFSET] = self.checksum;
        out[0x0A..0x10].copy_from_slice(&self.reserved);
        out[0x10..0x20].copy_from_slice(&self.name);
        out
    }

    /// XOR of the first nine encoded bytes.
    pub fn calc_checksum(&self) -> u8 {
        self.to_bytes()[..CHECKSUM_OFFSET]
            .iter()
            .fold(0u8, |acc, b| acc ^ b)
    }

    /// Recomputes and stores the checksum.
    pub fn seal(&mut self) {
        self.checksum = self.calc_checksum();
    }

    pub fn checksum_ok(&self) -> bool {
        self.checksum == self.calc_checksum()
    }

    /// Checks the checksum and that the type is a known opcode.
    pub fn validate(&self) -> Result<(), BlockError> {
        let computed = self.calc_checksum();
        if self.checksum != computed {
            return Err(BlockError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        if !BlockType::is_valid(self.type_id) {
            return Err(BlockError::UnknownType(self.type_id));
        }
        Ok(())
    }

    /// The decoded opcode, or `None` when the type byte is not recognized.
    pub fn kind(&self) -> Option<BlockType> {
        BlockType::from_u8(self.type_id)
    }

    /// Returns the name up to the first NUL.
    ///
    /// Invalid UTF-8 is replaced lossily since names are display-only.
    pub fn name_str(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Stores `name`, truncated to [`BLOCK_NAME_MAX_LEN`] bytes on a char
    /// boundary, NUL padded.
    pub fn set_name(&mut self, name: &str) {
        let mut end = name.len().min(BLOCK_NAME_MAX_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name = [0; NAME_FIELD_LEN];
        self.name[..end].copy_from_slice(&name.as_bytes()[..end]);
    }

    /// True for a slot that was never programmed (erased flash reads 0xFF).
    pub fn is_blank(&self) -> bool {
        self.to_bytes().iter().all(|b| *b == 0xFF)
    }
}

impl fmt::Display for BlockData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{}", kind)?,
            None => write!(f, "unknown (0x{:02X})", self.type_id)?,
        }
        let name = self.name_str();
        if !name.is_empty() {
            write!(f, " \"{}\"", name)?;
        }
        Ok(())
    }
}
