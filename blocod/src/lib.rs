//! # Bloco Device Runtime
//!
//! The board and robot main loops, and a host daemon that runs both against
//! a simulated radio medium.
//!
//! ## Philosophy
//!
//! - **Nodes own their loops**: Each node's `step` is one pass of its main
//!   loop and reports how long to sleep before the next pass
//! - **Hardware is injected**: Nodes only see `hal` traits, so the same code
//!   runs on simulated or real devices
//! - **Deterministic mode is first-class**: The daemon drives a virtual
//!   clock, so a scenario always produces the same transcript
//!
//! ## Responsibilities
//!
//! - Board: button gestures, slot polling, program send, JSON commands
//! - Robot: pairing feedback, transfer reception, program execution
//! - Daemon: scenario scripts, configuration, run summary

pub mod board;
pub mod commands;
pub mod config;
pub mod robo;
pub mod runtime;
pub mod scenario;

pub use board::{BoardHardware, BoardNode};
pub use commands::{
    BlockReport, BoardCommand, BoardResponse, ComposeBlock, ComposeError, ComposeRequest,
    SlotReport,
};
pub use config::{ConfigError, DaemonConfig, NodeConfig};
pub use robo::{RoboHardware, RoboNode};
pub use runtime::{Daemon, DaemonError, DaemonOptions, DaemonSummary, DEMO_SCRIPT};
pub use scenario::{NodeId, Scenario, ScenarioError, ScenarioStep};

use services_transfer::TransferError;
use thiserror::Error;

/// Errors surfaced by node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("invalid command: {0}")]
    Command(#[from] serde_json::Error),
}
