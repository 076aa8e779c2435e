//! # Scenario Scripts
//!
//! A line-based script of physical actions for deterministic runs of a
//! board and a robot.
//!
//! ## Format
//!
//! - Button: `hold board 4500ms`, `press robo` (a 100ms tap)
//! - Time: `wait 600ms`, `wait 2s`
//! - Slots: `insert 0 forward [name]`, `remove 0`
//! - Programs: `compose forward,param2,beep,end`
//! - Pairing: `unpair board`
//! - Serial console: `command {"cmd":"GET_STATUS"}`
//! - Comments: `# ...`, also after a step (not after `command`)
//!
//! Block types are snake_case names or hex bytes (`0x10`).
//!
//! ## Example
//!
//! ```text
//! # Pair, then send a program
//! hold robo 4500ms
//! hold board 4500ms     # board finds the robot
//! compose forward,param2,end
//! wait 3s
//! ```

use block_types::BlockType;
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Length of a `press`.
pub const TAP_MS: u64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScenarioError {
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Empty script")]
    EmptyScript,

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Unknown block type: {0}")]
    UnknownBlock(String),

    #[error("Invalid slot: {0}")]
    InvalidSlot(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeId {
    Board,
    Robo,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Board => write!(f, "board"),
            NodeId::Robo => write!(f, "robo"),
        }
    }
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioStep {
    /// Hold a node's button down for a duration
    Hold { node: NodeId, ms: u64 },
    /// Let both nodes run
    Wait(u64),
    /// Put a freshly built block in a board slot
    Insert {
        slot: usize,
        kind: BlockType,
        name: Option<String>,
    },
    /// Take the block out of a board slot
    Remove { slot: usize },
    /// Send an arbitrary program from the board
    Compose(Vec<BlockType>),
    /// Drop a node's peer, notifying it
    Unpair { node: NodeId },
    /// A board JSON command line
    Command(String),
}

#[derive(Debug, Clone, Default)]
pub struct Scenario {
    steps: VecDeque<ScenarioStep>,
}

impl Scenario {
    pub fn from_text(text: &str) -> Result<Self, ScenarioError> {
        let mut steps = VecDeque::new();

        for (line_num, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step = Self::parse_line(line).map_err(|err| ScenarioError::ParseError {
                line: line_num + 1,
                message: err.to_string(),
            })?;
            steps.push_back(step);
        }

        if steps.is_empty() {
            return Err(ScenarioError::EmptyScript);
        }
        Ok(Self { steps })
    }

    fn parse_line(line: &str) -> Result<ScenarioStep, ScenarioError> {
        if let Some(json) = line.strip_prefix("command ") {
            return Ok(ScenarioStep::Command(json.trim().to_string()));
        }

        let line = match line.split_once('#') {
            Some((step, _comment)) => step.trim(),
            None => line,
        };
        let parts: Vec<&str> = line.split_whitespace().collect();
        let args = &parts[1..];

        match parts[0].to_lowercase().as_str() {
            "hold" => Ok(ScenarioStep::Hold {
                node: Self::parse_node(Self::arg(args, 0, "node")?)?,
                ms: Self::parse_duration(Self::arg(args, 1, "duration")?)?,
            }),
            "press" => Ok(ScenarioStep::Hold {
                node: Self::parse_node(Self::arg(args, 0, "node")?)?,
                ms: TAP_MS,
            }),
            "wait" => Ok(ScenarioStep::Wait(Self::parse_duration(Self::arg(
                args, 0, "duration",
            )?)?)),
            "insert" => Ok(ScenarioStep::Insert {
                slot: Self::parse_slot(Self::arg(args, 0, "slot")?)?,
                kind: Self::parse_block(Self::arg(args, 1, "block type")?)?,
                name: (args.len() > 2).then(|| args[2..].join(" ")),
            }),
            "remove" => Ok(ScenarioStep::Remove {
                slot: Self::parse_slot(Self::arg(args, 0, "slot")?)?,
            }),
            "compose" => {
                let list = args.join("");
                if list.is_empty() {
                    return Err(ScenarioError::MissingArgument("block list".to_string()));
                }
                let kinds = list
                    .split(',')
                    .filter(|name| !name.is_empty())
                    .map(Self::parse_block)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ScenarioStep::Compose(kinds))
            }
            "unpair" => Ok(ScenarioStep::Unpair {
                node: Self::parse_node(Self::arg(args, 0, "node")?)?,
            }),
            "command" => Err(ScenarioError::MissingArgument("json".to_string())),
            other => Err(ScenarioError::UnknownStep(other.to_string())),
        }
    }

    fn arg<'a>(args: &[&'a str], index: usize, what: &str) -> Result<&'a str, ScenarioError> {
        args.get(index)
            .copied()
            .ok_or_else(|| ScenarioError::MissingArgument(what.to_string()))
    }

    fn parse_node(name: &str) -> Result<NodeId, ScenarioError> {
        match name.to_lowercase().as_str() {
            "board" | "sender" => Ok(NodeId::Board),
            "robo" | "robot" | "receiver" => Ok(NodeId::Robo),
            _ => Err(ScenarioError::UnknownNode(name.to_string())),
        }
    }

    fn parse_block(name: &str) -> Result<BlockType, ScenarioError> {
        BlockType::from_name(name).ok_or_else(|| ScenarioError::UnknownBlock(name.to_string()))
    }

    fn parse_slot(text: &str) -> Result<usize, ScenarioError> {
        text.parse()
            .map_err(|_| ScenarioError::InvalidSlot(text.to_string()))
    }

    /// Parses `100ms` or `2s`.
    fn parse_duration(s: &str) -> Result<u64, ScenarioError> {
        let s = s.trim().to_lowercase();
        let parsed = if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().ok()
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().ok().map(|secs| secs * 1_000)
        } else {
            None
        };
        parsed.ok_or(ScenarioError::InvalidDuration(s))
    }

    pub fn next_step(&mut self) -> Option<ScenarioStep> {
        self.steps.pop_front()
    }

    pub fn has_more(&self) -> bool {
        !self.steps.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}
