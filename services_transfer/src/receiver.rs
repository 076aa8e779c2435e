//! Robot-side transfer handling from the radio callback

use crate::session::{SessionOutcome, TransferSession};
use crate::slot::ProgramSlot;
use crate::TransferConfig;
use hal::RadioTransport;
use link_protocol::{LinkMessage, MacAddress};
use services_logger::{LogEntry, LogLevel, Logger};
use std::sync::{Arc, Mutex};

/// Feeds transfer messages into a [`TransferSession`], publishes completed
/// programs to a [`ProgramSlot`] and acknowledges them.
///
/// Address filtering happens before this point.
pub struct TransferReceiver {
    // Only the receive context touches the session, so the lock is never
    // contended.
    session: Mutex<TransferSession>,
    slot: Arc<ProgramSlot>,
    radio: Arc<dyn RadioTransport>,
    logger: Logger,
}

impl TransferReceiver {
    pub fn new(
        config: TransferConfig,
        slot: Arc<ProgramSlot>,
        radio: Arc<dyn RadioTransport>,
        logger: Logger,
    ) -> Self {
        Self {
            session: Mutex::new(TransferSession::new(config.counting, logger.clone())),
            slot,
            radio,
            logger,
        }
    }

    pub fn slot(&self) -> &Arc<ProgramSlot> {
        &self.slot
    }

    pub fn is_in_progress(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_in_progress()
    }

    /// Handles a message from `src`. Returns the session outcome;
    /// non-transfer messages come back as [`SessionOutcome::Ignored`].
    pub fn handle(&self, src: MacAddress, message: &LinkMessage) -> SessionOutcome {
        let outcome = self
            .session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .handle(message);

        if let SessionOutcome::Completed { program, expected } = &outcome {
            if self.slot.give(program.clone()).is_some() {
                self.logger
                    .warn("replaced a program that had not started executing");
            }
            self.acknowledge(src, *expected);
            self.logger.log(
                LogEntry::new(LogLevel::Info, "program received")
                    .with_field("blocks", expected),
            );
        }
        outcome
    }

    fn acknowledge(&self, src: MacAddress, expected: usize) {
        if !self.radio.has_peer(src) {
            if let Err(err) = self.radio.add_peer(src) {
                self.logger.log(
                    LogEntry::new(LogLevel::Warn, "could not register sender")
                        .with_field("error", err),
                );
            }
        }
        let ack = LinkMessage::TransferAck {
            count: expected as u8,
        };
        if let Err(err) = self.radio.send(src, &ack.encode()) {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "ack send failed").with_field("error", err),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::{BlockData, BlockType};
    use services_logger::LogCapture;
    use sim_hal::SimAir;

    fn board() -> MacAddress {
        MacAddress::new([0xB0, 0, 0, 0, 0, 1])
    }

    fn robo() -> MacAddress {
        MacAddress::new([0xC0, 0, 0, 0, 0, 2])
    }

    fn receiver(air: &SimAir) -> (TransferReceiver, LogCapture) {
        let capture = LogCapture::new();
        let receiver = TransferReceiver::new(
            TransferConfig::default(),
            Arc::new(ProgramSlot::new()),
            Arc::new(air.radio(robo())),
            Logger::new("transfer").with_capture(capture.clone()),
        );
        (receiver, capture)
    }

    fn run(receiver: &TransferReceiver, kinds: &[BlockType]) -> SessionOutcome {
        receiver.handle(
            board(),
            &LinkMessage::TransferStart {
                count: kinds.len() as u8,
            },
        );
        for (i, kind) in kinds.iter().enumerate() {
            receiver.handle(
                board(),
                &LinkMessage::BlockData {
                    index: i as u8,
                    block: BlockData::new(*kind),
                },
            );
        }
        receiver.handle(board(), &LinkMessage::TransferEnd)
    }

    #[test]
    fn test_completion_acks_and_hands_off() {
        let air = SimAir::new();
        let (receiver, _) = receiver(&air);
        run(&receiver, &[BlockType::Forward, BlockType::Beep, BlockType::End]);

        assert_eq!(air.sent_by(robo()), vec![LinkMessage::TransferAck { count: 3 }]);
        assert!(air.radio(robo()).has_peer(board()));
        assert_eq!(receiver.slot().take().map(|p| p.len()), Some(3));
    }

    /// Radio that records whether a program was pending at each send.
    struct SlotWatchRadio {
        slot: Arc<ProgramSlot>,
        pending_at_send: Mutex<Vec<bool>>,
    }

    impl RadioTransport for SlotWatchRadio {
        fn local_address(&self) -> MacAddress {
            robo()
        }

        fn add_peer(&self, _address: MacAddress) -> Result<(), hal::SendError> {
            Ok(())
        }

        fn remove_peer(&self, _address: MacAddress) {}

        fn has_peer(&self, _address: MacAddress) -> bool {
            true
        }

        fn send(&self, _dest: MacAddress, _payload: &[u8]) -> Result<(), hal::SendError> {
            self.pending_at_send
                .lock()
                .unwrap()
                .push(self.slot.is_pending());
            Ok(())
        }

        fn set_receiver(&self, _receiver: Arc<dyn hal::RadioReceiver>) {}
    }

    #[test]
    fn test_program_is_handed_off_before_ack() {
        let slot = Arc::new(ProgramSlot::new());
        let radio = Arc::new(SlotWatchRadio {
            slot: slot.clone(),
            pending_at_send: Mutex::new(Vec::new()),
        });
        let receiver = TransferReceiver::new(
            TransferConfig::default(),
            slot,
            radio.clone(),
            Logger::new("transfer"),
        );
        run(&receiver, &[BlockType::Beep, BlockType::End]);

        assert_eq!(*radio.pending_at_send.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_incomplete_does_not_ack_or_hand_off() {
        let air = SimAir::new();
        let (receiver, capture) = receiver(&air);
        receiver.handle(board(), &LinkMessage::TransferStart { count: 5 });
        receiver.handle(
            board(),
            &LinkMessage::BlockData {
                index: 0,
                block: BlockData::new(BlockType::Forward),
            },
        );
        receiver.handle(board(), &LinkMessage::TransferEnd);

        assert!(air.transcript().is_empty());
        assert!(!receiver.slot().is_pending());
        assert_eq!(capture.warnings().len(), 1);
    }

    #[test]
    fn test_second_completion_overwrites_pending() {
        let air = SimAir::new();
        let (receiver, capture) = receiver(&air);
        run(&receiver, &[BlockType::Forward]);
        run(&receiver, &[BlockType::Beep, BlockType::Beep]);

        assert!(capture.contains("replaced a program"));
        assert_eq!(receiver.slot().take().map(|p| p.len()), Some(2));
    }
}
