//! State shared between the radio callback and the task

use link_protocol::MacAddress;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

const PRESENT: u64 = 1 << 63;

/// Lock-free cell holding zero or one peer address.
///
/// The address occupies the low 48 bits; bit 63 marks presence so that the
/// all-zero address is still representable.
#[derive(Debug, Default)]
pub struct AtomicPeer(AtomicU64);

impl AtomicPeer {
    pub fn new(peer: Option<MacAddress>) -> Self {
        Self(AtomicU64::new(Self::encode(peer)))
    }

    fn encode(peer: Option<MacAddress>) -> u64 {
        peer.map(|address| address.to_u64() | PRESENT).unwrap_or(0)
    }

    fn decode(raw: u64) -> Option<MacAddress> {
        (raw & PRESENT != 0).then(|| MacAddress::from_u64(raw))
    }

    pub fn get(&self) -> Option<MacAddress> {
        Self::decode(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, peer: MacAddress) {
        self.0.store(Self::encode(Some(peer)), Ordering::SeqCst);
    }

    /// Empties the cell and returns what it held.
    pub fn take(&self) -> Option<MacAddress> {
        Self::decode(self.0.swap(0, Ordering::SeqCst))
    }

    /// Clears the cell only if it currently holds `peer`.
    pub fn clear_if(&self, peer: MacAddress) -> bool {
        self.0
            .compare_exchange(
                Self::encode(Some(peer)),
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    pub fn matches(&self, address: MacAddress) -> bool {
        self.get() == Some(address)
    }
}

/// Pairing state visible to both execution contexts.
#[derive(Debug, Default)]
pub struct PairingShared {
    /// Current peer. Broadcast is never stored here.
    pub(crate) peer: AtomicPeer,
    pub(crate) active: AtomicBool,
    pub(crate) success: AtomicBool,
    /// Peer that unpaired us from the radio callback; cleanup pending.
    pub(crate) unpaired_by: AtomicPeer,
}

impl PairingShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peer(&self) -> Option<MacAddress> {
        self.peer.get()
    }

    pub fn is_paired(&self) -> bool {
        self.peer.get().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> MacAddress {
        MacAddress::new([0x24, 0x6F, 0x28, 0, 0, last])
    }

    #[test]
    fn test_empty_by_default() {
        let cell = AtomicPeer::default();
        assert_eq!(cell.get(), None);
        assert_eq!(cell.take(), None);
    }

    #[test]
    fn test_zero_address_is_representable() {
        let zero = MacAddress::new([0; 6]);
        let cell = AtomicPeer::new(Some(zero));
        assert_eq!(cell.get(), Some(zero));
    }

    #[test]
    fn test_set_take() {
        let cell = AtomicPeer::new(None);
        cell.set(addr(1));
        assert!(cell.matches(addr(1)));
        assert_eq!(cell.take(), Some(addr(1)));
        assert_eq!(cell.get(), None);
    }

    #[test]
    fn test_clear_if_only_matching() {
        let cell = AtomicPeer::new(Some(addr(1)));
        assert!(!cell.clear_if(addr(2)));
        assert_eq!(cell.get(), Some(addr(1)));
        assert!(cell.clear_if(addr(1)));
        assert_eq!(cell.get(), None);
        assert!(!cell.clear_if(addr(1)));
    }

    #[test]
    fn test_shared_flags() {
        let shared = PairingShared::new();
        assert!(!shared.is_paired());
        assert!(!shared.is_active());
        shared.peer.set(addr(3));
        assert!(shared.is_paired());
        assert_eq!(shared.peer(), Some(addr(3)));
    }
}
