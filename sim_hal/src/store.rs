//! Pairing stores for simulation and the host daemon

use hal::{PairingStore, StoreError};
use link_protocol::MacAddress;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Volatile store. Clones share contents so a test can inspect what a node
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryPairingStore {
    peer: Arc<Mutex<Option<MacAddress>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryPairingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(peer: MacAddress) -> Self {
        let store = Self::new();
        *store.peer.lock().unwrap_or_else(|p| p.into_inner()) = Some(peer);
        store
    }

    /// Current contents, without counting as a load.
    pub fn peer(&self) -> Option<MacAddress> {
        *self.peer.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of save and clear operations performed.
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self, value: Option<MacAddress>) {
        *self.peer.lock().unwrap_or_else(|p| p.into_inner()) = value;
        *self.writes.lock().unwrap_or_else(|p| p.into_inner()) += 1;
    }
}

impl PairingStore for MemoryPairingStore {
    fn load(&mut self) -> Result<Option<MacAddress>, StoreError> {
        Ok(self.peer())
    }

    fn save(&mut self, address: MacAddress) -> Result<(), StoreError> {
        self.write(Some(address));
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.write(None);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PairingRecord {
    peer: MacAddress,
}

/// JSON file holding the paired peer. A missing file means "not paired".
#[derive(Debug, Clone)]
pub struct FilePairingStore {
    path: PathBuf,
}

impl FilePairingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PairingStore for FilePairingStore {
    fn load(&mut self) -> Result<Option<MacAddress>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: PairingRecord =
            serde_json::from_str(&text).map_err(|err| StoreError::Corrupt(err.to_string()))?;
        Ok(Some(record.peer))
    }

    fn save(&mut self, address: MacAddress) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&PairingRecord { peer: address })
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
