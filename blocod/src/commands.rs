//! # Board Control Commands
//!
//! The board's line-oriented JSON command surface, as spoken over its serial
//! console by a host tool.
//!
//! ## Command Set
//!
//! - `{"cmd":"SCAN_CHANNELS"}` - Read every slot and report what is there
//! - `{"cmd":"SEND_TO_ROBOT"}` - Send the slot program, as a short press does
//! - `{"cmd":"SEND_BLOCKS","blocks":[{"type":16,"name":"Forward"}]}` - Build
//!   and send an arbitrary program
//! - `{"cmd":"GET_STATUS"}` - Slot count, blocks present, paired flag
//!
//! Every command gets exactly one reply object, tagged by `"response"`.

use block_types::{BlockBuilder, BlockData, BlockError, MAX_BLOCKS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors turning a compose request into blocks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("block count out of range: {0}")]
    CountOutOfRange(usize),

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// A block as a host describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeBlock {
    #[serde(rename = "type")]
    pub type_id: u8,
    /// Defaults to the block's label.
    #[serde(default)]
    pub name: String,
}

/// An arbitrary program supplied from outside the slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub blocks: Vec<ComposeBlock>,
}

impl ComposeRequest {
    /// Builds sealed records, rejecting empty or oversized programs and
    /// unknown type bytes.
    pub fn build(&self, builder: &mut BlockBuilder) -> Result<Vec<BlockData>, ComposeError> {
        if self.blocks.is_empty() || self.blocks.len() > MAX_BLOCKS {
            return Err(ComposeError::CountOutOfRange(self.blocks.len()));
        }
        self.blocks
            .iter()
            .map(|block| {
                if block.name.is_empty() {
                    let kind = block_types::BlockType::from_u8(block.type_id)
                        .ok_or(BlockError::UnknownType(block.type_id))?;
                    Ok(builder.build(kind, kind.label()))
                } else {
                    Ok(builder.build_raw(block.type_id, &block.name)?)
                }
            })
            .collect()
    }
}

/// Inbound command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardCommand {
    ScanChannels,
    SendToRobot,
    SendBlocks(ComposeRequest),
    GetStatus,
}

impl BoardCommand {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Decoded contents of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReport {
    #[serde(rename = "type")]
    pub type_id: u8,
    pub subtype: u8,
    pub param1: u8,
    pub param2: u8,
    /// Serial as eight hex digits.
    pub serial: String,
    pub version: u8,
    pub checksum: u8,
    pub checksum_valid: bool,
    pub name: String,
    /// Known type and good checksum.
    pub valid: bool,
}

impl From<&BlockData> for BlockReport {
    fn from(block: &BlockData) -> Self {
        Self {
            type_id: block.type_id,
            subtype: block.subtype,
            param1: block.param1,
            param2: block.param2,
            serial: block
                .serial
                .iter()
                .map(|byte| format!("{:02X}", byte))
                .collect(),
            version: block.version,
            checksum: block.checksum,
            checksum_valid: block.checksum_ok(),
            name: block.name_str(),
            valid: block.validate().is_ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotReport {
    pub slot: usize,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reply to a [`BoardCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "response", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BoardResponse {
    ScanResult {
        slots: Vec<SlotReport>,
    },
    SendOk {
        blocks_sent: usize,
    },
    Status {
        num_slots: usize,
        blocks_present: usize,
        paired: bool,
    },
    Error {
        msg: String,
    },
}

impl BoardResponse {
    pub fn error(msg: impl ToString) -> Self {
        Self::Error {
            msg: msg.to_string(),
        }
    }

    /// One-line JSON rendering.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|err| format!(r#"{{"response":"ERROR","msg":"{}"}}"#, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::BlockType;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            BoardCommand::parse(r#"{"cmd":"SCAN_CHANNELS"}"#).unwrap(),
            BoardCommand::ScanChannels
        );
        assert_eq!(
            BoardCommand::parse(r#" {"cmd":"GET_STATUS"} "#).unwrap(),
            BoardCommand::GetStatus
        );
        assert_eq!(
            BoardCommand::parse(r#"{"cmd":"SEND_BLOCKS","blocks":[{"type":16,"name":"Go"}]}"#)
                .unwrap(),
            BoardCommand::SendBlocks(ComposeRequest {
                blocks: vec![ComposeBlock {
                    type_id: 16,
                    name: "Go".to_string()
                }]
            })
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(BoardCommand::parse(r#"{"cmd":"REBOOT"}"#).is_err());
        assert!(BoardCommand::parse("SCAN_CHANNELS").is_err());
    }

    #[test]
    fn test_compose_builds_sealed_blocks() {
        let request = ComposeRequest {
            blocks: vec![
                ComposeBlock {
                    type_id: 0x10,
                    name: "Forward".to_string(),
                },
                ComposeBlock {
                    type_id: 0x60,
                    name: String::new(),
                },
            ],
        };
        let mut builder = BlockBuilder::new([0xB0, 0x0C]);
        let blocks = request.build(&mut builder).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|block| block.validate().is_ok()));
        assert_eq!(blocks[0].kind(), Some(BlockType::Forward));
        assert_eq!(blocks[1].name_str(), BlockType::Param2.label());
    }

    #[test]
    fn test_compose_count_out_of_range() {
        let mut builder = BlockBuilder::new([0, 0]);
        assert_eq!(
            ComposeRequest::default().build(&mut builder),
            Err(ComposeError::CountOutOfRange(0))
        );
        let nine = ComposeRequest {
            blocks: vec![
                ComposeBlock {
                    type_id: 0x30,
                    name: String::new()
                };
                9
            ],
        };
        assert_eq!(
            nine.build(&mut builder),
            Err(ComposeError::CountOutOfRange(9))
        );
    }

    #[test]
    fn test_compose_unknown_type() {
        let request = ComposeRequest {
            blocks: vec![ComposeBlock {
                type_id: 0xEE,
                name: "x".to_string(),
            }],
        };
        assert_eq!(
            request.build(&mut BlockBuilder::new([0, 0])),
            Err(ComposeError::Block(BlockError::UnknownType(0xEE)))
        );
    }

    #[test]
    fn test_block_report_fields() {
        let mut builder = BlockBuilder::with_counter([0xAB, 0xCD], 0x0102);
        let block = builder.build(BlockType::Beep, "Beep");
        let report = BlockReport::from(&block);
        assert_eq!(report.serial, "ABCD0102");
        assert!(report.checksum_valid);
        assert!(report.valid);

        let mut corrupted = block;
        corrupted.param1 ^= 0x01;
        let report = BlockReport::from(&corrupted);
        assert!(!report.checksum_valid);
        assert!(!report.valid);
    }

    #[test]
    fn test_response_json_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&BoardResponse::SendOk { blocks_sent: 3 }.to_json()).unwrap();
        assert_eq!(value, json!({"response": "SEND_OK", "blocks_sent": 3}));

        let empty = BoardResponse::ScanResult {
            slots: vec![SlotReport {
                slot: 1,
                present: false,
                block: None,
                error: None,
            }],
        };
        let value: serde_json::Value = serde_json::from_str(&empty.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"response": "SCAN_RESULT", "slots": [{"slot": 1, "present": false}]})
        );

        let value: serde_json::Value =
            serde_json::from_str(&BoardResponse::error("not paired").to_json()).unwrap();
        assert_eq!(value, json!({"response": "ERROR", "msg": "not paired"}));
    }
}
