//! Node and daemon configuration

use serde::{Deserialize, Serialize};
use services_button::GestureConfig;
use services_executor::ExecutorTiming;
use services_pairing::PairingConfig;
use services_transfer::TransferConfig;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything one node needs. Absent fields keep their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub gesture: GestureConfig,
    pub pairing: PairingConfig,
    pub transfer: TransferConfig,
    pub executor: ExecutorTiming,
    /// Main loop period outside pairing.
    pub idle_tick_ms: u64,
    /// Main loop period while the board is pairing.
    pub pairing_tick_ms: u64,
    /// Board slot presence poll period.
    pub slot_poll_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            gesture: GestureConfig::default(),
            pairing: PairingConfig::default(),
            transfer: TransferConfig::default(),
            executor: ExecutorTiming::default(),
            idle_tick_ms: 100,
            pairing_tick_ms: 50,
            slot_poll_interval_ms: 1_000,
        }
    }
}

/// Daemon configuration file. The section a node reads fixes its role.
///
/// ```json
/// { "board": { "pairing": { "timeout_ms": 10000 } }, "robo": {} }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub board: NodeConfig,
    pub robo: NodeConfig,
}

impl DaemonConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
