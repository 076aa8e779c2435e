//! Protocol messages and their wire codec

use crate::address::MacAddress;
use block_types::{BlockData, BLOCK_DATA_SIZE};
use std::fmt;
use thiserror::Error;

/// Largest datagram the radio accepts.
pub const MAX_PAYLOAD_LEN: usize = 250;

/// Leading byte of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    TransferStart = 0x01,
    BlockData = 0x02,
    TransferEnd = 0x03,
    TransferAck = 0x04,
    PairRequest = 0x10,
    PairAck = 0x11,
    Unpair = 0x12,
}

impl MessageTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::TransferStart),
            0x02 => Some(Self::BlockData),
            0x03 => Some(Self::TransferEnd),
            0x04 => Some(Self::TransferAck),
            0x10 => Some(Self::PairRequest),
            0x11 => Some(Self::PairAck),
            0x12 => Some(Self::Unpair),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Number of body bytes following the tag.
    pub const fn body_len(self) -> usize {
        match self {
            Self::TransferStart | Self::TransferAck => 1,
            Self::BlockData => 1 + BLOCK_DATA_SIZE,
            Self::TransferEnd | Self::Unpair => 0,
            Self::PairRequest | Self::PairAck => 6,
        }
    }

    /// Pairing-class messages bypass peer address filtering.
    pub const fn is_pairing(self) -> bool {
        matches!(self, Self::PairRequest | Self::PairAck | Self::Unpair)
    }
}

/// Failure to decode a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown message tag 0x{0:02X}")]
    UnknownTag(u8),

    #[error("{tag:?} body truncated: need {expected} bytes, got {actual}")]
    Truncated {
        tag: MessageTag,
        expected: usize,
        actual: usize,
    },
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    TransferStart { count: u8 },
    BlockData { index: u8, block: BlockData },
    TransferEnd,
    TransferAck { count: u8 },
    PairRequest { address: MacAddress },
    PairAck { address: MacAddress },
    Unpair,
}

impl LinkMessage {
    pub fn tag(&self) -> MessageTag {
        match self {
            Self::TransferStart { .. } => MessageTag::TransferStart,
            Self::BlockData { .. } => MessageTag::BlockData,
            Self::TransferEnd => MessageTag::TransferEnd,
            Self::TransferAck { .. } => MessageTag::TransferAck,
            Self::PairRequest { .. } => MessageTag::PairRequest,
            Self::PairAck { .. } => MessageTag::PairAck,
            Self::Unpair => MessageTag::Unpair,
        }
    }

    /// Encodes the message as tag byte plus body.
    pub fn encode(&self) -> Vec<u8> {
        let tag = self.tag();
        let mut out = Vec::with_capacity(1 + tag.body_len());
        out.push(tag.as_u8());
        match self {
            Self::TransferStart { count } | Self::TransferAck { count } => out.push(*count),
            Self::BlockData { index, block } => {
                out.push(*index);
                out.extend_from_slice(&block.to_bytes());
            }
            Self::PairRequest { address } | Self::PairAck { address } => {
                out.extend_from_slice(address.as_bytes())
            }
            Self::TransferEnd | Self::Unpair => {}
        }
        out
    }

    /// Decodes a datagram.
    ///
    /// Bytes beyond the tag's body length are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let (&raw_tag, body) = payload.split_first().ok_or(DecodeError::Empty)?;
        let tag = MessageTag::from_u8(raw_tag).ok_or(DecodeError::UnknownTag(raw_tag))?;
        if body.len() < tag.body_len() {
            return Err(DecodeError::Truncated {
                tag,
                expected: tag.body_len(),
                actual: body.len(),
            });
        }

        let message = match tag {
            MessageTag::TransferStart => Self::TransferStart { count: body[0] },
            MessageTag::TransferAck => Self::TransferAck { count: body[0] },
            MessageTag::BlockData => {
                let mut record = [0u8; BLOCK_DATA_SIZE];
                record.copy_from_slice(&body[1..1 + BLOCK_DATA_SIZE]);
                Self::BlockData {
                    index: body[0],
                    block: BlockData::from_array(&record),
                }
            }
            MessageTag::TransferEnd => Self::TransferEnd,
            MessageTag::Unpair => Self::Unpair,
            MessageTag::PairRequest | MessageTag::PairAck => {
                let mut bytes = [0u8; 6];
                bytes.copy_from_slice(&body[..6]);
                let address = MacAddress::new(bytes);
                if tag == MessageTag::PairRequest {
                    Self::PairRequest { address }
                } else {
                    Self::PairAck { address }
                }
            }
        };
        Ok(message)
    }
}

impl fmt::Display for LinkMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TransferStart { count } => write!(f, "TransferStart({})", count),
            Self::BlockData { index, block } => write!(f, "BlockData[{}]: {}", index, block),
            Self::TransferEnd => write!(f, "TransferEnd"),
            Self::TransferAck { count } => write!(f, "TransferAck({})", count),
            Self::PairRequest { address } => write!(f, "PairRequest({})", address),
            Self::PairAck { address } => write!(f, "PairAck({})", address),
            Self::Unpair => write!(f, "Unpair"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::BlockType;

    fn addr() -> MacAddress {
        MacAddress::new([0x24, 0x6F, 0x28, 0x01, 0x02, 0x03])
    }

    #[test]
    fn test_encoded_sizes_fit_payload() {
        let block = BlockData::new(BlockType::Forward);
        let messages = [
            LinkMessage::TransferStart { count: 3 },
            LinkMessage::BlockData { index: 0, block },
            LinkMessage::TransferEnd,
            LinkMessage::TransferAck { count: 3 },
            LinkMessage::PairRequest { address: addr() },
            LinkMessage::PairAck { address: addr() },
            LinkMessage::Unpair,
        ];
        for message in messages {
            let bytes = message.encode();
            assert_eq!(bytes.len(), 1 + message.tag().body_len());
            assert!(bytes.len() <= MAX_PAYLOAD_LEN);
            assert_eq!(LinkMessage::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_block_data_layout() {
        let block = BlockData::new(BlockType::Spin);
        let bytes = LinkMessage::BlockData { index: 5, block }.encode();
        assert_eq!(bytes[0], 0x02);
        assert_eq!(bytes[1], 5);
        assert_eq!(&bytes[2..], &block.to_bytes());
    }

    #[test]
    fn test_pair_request_layout() {
        let bytes = LinkMessage::PairRequest { address: addr() }.encode();
        assert_eq!(bytes, vec![0x10, 0x24, 0x6F, 0x28, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(LinkMessage::decode(&[]), Err(DecodeError::Empty));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(LinkMessage::decode(&[0x7F, 1]), Err(DecodeError::UnknownTag(0x7F)));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(matches!(
            LinkMessage::decode(&[0x01]),
            Err(DecodeError::Truncated {
                tag: MessageTag::TransferStart,
                ..
            })
        ));
        assert!(matches!(
            LinkMessage::decode(&[0x02, 0, 1, 2]),
            Err(DecodeError::Truncated {
                tag: MessageTag::BlockData,
                expected: 33,
                actual: 3
            })
        ));
        assert!(matches!(
            LinkMessage::decode(&[0x11, 1, 2, 3, 4, 5]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        assert_eq!(
            LinkMessage::decode(&[0x03, 0xAA, 0xBB]).unwrap(),
            LinkMessage::TransferEnd
        );
    }

    #[test]
    fn test_pairing_class() {
        assert!(MessageTag::PairRequest.is_pairing());
        assert!(MessageTag::Unpair.is_pairing());
        assert!(!MessageTag::BlockData.is_pairing());
        assert!(!MessageTag::TransferAck.is_pairing());
    }
}
