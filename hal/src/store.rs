//! Persistent pairing storage

use link_protocol::MacAddress;
use thiserror::Error;

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored pairing record is corrupt: {0}")]
    Corrupt(String),
}

/// Non-volatile storage for zero or one peer address.
///
/// Only ever used from task context.
pub trait PairingStore: Send {
    fn load(&mut self) -> Result<Option<MacAddress>, StoreError>;

    fn save(&mut self, address: MacAddress) -> Result<(), StoreError>;

    /// Removes the stored peer. Clearing an empty store succeeds.
    fn clear(&mut self) -> Result<(), StoreError>;
}
