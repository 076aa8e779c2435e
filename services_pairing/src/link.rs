//! Radio-callback side of pairing
//!
//! Everything here runs in the radio's asynchronous context: no blocking,
//! no storage access. State changes are published through
//! [`PairingShared`] and picked up by the task tick.

use crate::shared::PairingShared;
use crate::PairingRole;
use hal::RadioTransport;
use link_protocol::{LinkMessage, MacAddress};
use services_logger::{LogEntry, LogLevel, Logger};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Receive-context handle on the pairing state.
#[derive(Clone)]
pub struct PairingLink {
    shared: Arc<PairingShared>,
    radio: Arc<dyn RadioTransport>,
    role: PairingRole,
    logger: Logger,
}

impl PairingLink {
    pub fn new(
        shared: Arc<PairingShared>,
        radio: Arc<dyn RadioTransport>,
        role: PairingRole,
        logger: Logger,
    ) -> Self {
        Self {
            shared,
            radio,
            role,
            logger,
        }
    }

    pub fn shared(&self) -> &Arc<PairingShared> {
        &self.shared
    }

    /// Address filter for non-pairing messages.
    ///
    /// While pairing is active the filter is open; otherwise only the
    /// current peer gets through, and nothing does when unpaired.
    pub fn accepts(&self, src: MacAddress) -> bool {
        self.shared.is_active() || self.shared.peer.matches(src)
    }

    /// Handles pairing-class messages. Returns false for any other message,
    /// which the caller must then run through [`PairingLink::accepts`].
    pub fn handle(&self, src: MacAddress, message: &LinkMessage) -> bool {
        match message {
            LinkMessage::PairRequest { address } => {
                if self.role == PairingRole::Responder {
                    self.on_pair_request(*address);
                }
                true
            }
            LinkMessage::PairAck { address } => {
                if self.role == PairingRole::Initiator {
                    self.on_pair_ack(*address);
                }
                true
            }
            LinkMessage::Unpair => {
                self.on_unpair(src);
                true
            }
            _ => false,
        }
    }

    fn on_pair_request(&self, requester: MacAddress) {
        // Only answered while this node is itself in pairing mode.
        if !self.shared.is_active() {
            return;
        }
        self.logger
            .log(LogEntry::new(LogLevel::Info, "pair request").with_field("from", requester));

        self.shared.peer.set(requester);
        if let Err(err) = self.radio.add_peer(requester) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "could not register requester")
                    .with_field("peer", requester)
                    .with_field("error", err),
            );
        }
        let ack = LinkMessage::PairAck {
            address: self.radio.local_address(),
        };
        if let Err(err) = self.radio.send(requester, &ack.encode()) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "pair ack send failed").with_field("error", err),
            );
        }
        self.shared.success.store(true, Ordering::SeqCst);
    }

    fn on_pair_ack(&self, responder: MacAddress) {
        if !self.shared.is_active() {
            return;
        }
        self.shared.peer.set(responder);
        self.shared.success.store(true, Ordering::SeqCst);
        self.logger
            .log(LogEntry::new(LogLevel::Info, "pair ack").with_field("from", responder));
    }

    fn on_unpair(&self, src: MacAddress) {
        if self.shared.peer.clear_if(src) {
            self.shared.unpaired_by.set(src);
            self.logger
                .log(LogEntry::new(LogLevel::Info, "unpaired by peer").with_field("peer", src));
        }
    }
}
