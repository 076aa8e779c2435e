//! # Radio Transport
//!
//! Connectionless datagrams addressed by hardware address.
//!
//! ## Design
//!
//! - Unicast destinations must be registered with [`RadioTransport::add_peer`]
//!   before sending; the broadcast address is registered the same way
//! - No delivery or ordering guarantee
//! - Payloads are at most [`link_protocol::MAX_PAYLOAD_LEN`] bytes
//! - Inbound datagrams are handed to a [`RadioReceiver`] from the radio's own
//!   context, never from the caller of `send`

use link_protocol::MacAddress;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a failed send.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("destination {0} is not a registered peer")]
    UnknownPeer(MacAddress),

    #[error("payload of {0} bytes exceeds the radio limit")]
    PayloadTooLarge(usize),

    #[error("peer table is full")]
    PeerTableFull,

    #[error("radio failure: {0}")]
    Failed(String),
}

/// Receives datagrams from the radio.
///
/// Runs in the radio's asynchronous context: implementations must not block
/// and must not touch persistent storage.
pub trait RadioReceiver: Send + Sync {
    fn on_receive(&self, src: MacAddress, payload: &[u8]);
}

/// A broadcast-capable datagram radio.
pub trait RadioTransport: Send + Sync {
    /// This node's own hardware address.
    fn local_address(&self) -> MacAddress;

    /// Registers a destination. Registering an existing peer is a no-op.
    fn add_peer(&self, address: MacAddress) -> Result<(), SendError>;

    /// Forgets a destination. Unknown peers are ignored.
    fn remove_peer(&self, address: MacAddress);

    fn has_peer(&self, address: MacAddress) -> bool;

    /// Queues one datagram. Success means the radio accepted it, not that
    /// anyone received it.
    fn send(&self, dest: MacAddress, payload: &[u8]) -> Result<(), SendError>;

    /// Installs the inbound callback, replacing any previous one.
    fn set_receiver(&self, receiver: Arc<dyn RadioReceiver>);
}
