//! # Robot Node
//!
//! The receiver: pairs with a board, accepts programs over the air and
//! drives its motors and eyes through them.
//!
//! Reception runs in the radio's receive context through [`RoboReceiver`];
//! completed programs land in a one-slot hand-off that
//! [`RoboNode::step`] drains into the executor.

use crate::config::NodeConfig;
use hal::{
    ButtonDevice, Delay, EyesDisplay, MotorDriver, PairingStore, RadioReceiver, RadioTransport,
    StatusLed, TimerDevice,
};
use link_protocol::{DecodeError, LinkMessage, MacAddress};
use services_button::GestureDetector;
use services_executor::{ExecutionSummary, Executor};
use services_logger::{LogEntry, LogLevel, Logger};
use services_pairing::{
    EyesIndicator, LedIndicator, PairingLink, PairingRole, PairingStateMachine,
};
use services_transfer::{ProgramSlot, SessionOutcome, TransferReceiver};
use std::sync::Arc;

/// Devices the robot runs on.
pub struct RoboHardware {
    pub radio: Arc<dyn RadioTransport>,
    pub store: Box<dyn PairingStore>,
    pub clock: Arc<dyn TimerDevice>,
    pub delay: Arc<dyn Delay>,
    pub button: Box<dyn ButtonDevice>,
    pub led: Box<dyn StatusLed>,
    pub motor: Box<dyn MotorDriver>,
    pub eyes: Arc<dyn EyesDisplay>,
}

/// Receive-context handler for the robot.
pub struct RoboReceiver {
    link: PairingLink,
    transfer: TransferReceiver,
    logger: Logger,
}

impl RoboReceiver {
    pub fn is_receiving(&self) -> bool {
        self.transfer.is_in_progress()
    }
}

impl RadioReceiver for RoboReceiver {
    fn on_receive(&self, src: MacAddress, payload: &[u8]) {
        let message = match LinkMessage::decode(payload) {
            Ok(message) => message,
            // Strangers are dropped silently, whatever they send.
            Err(DecodeError::UnknownTag(_)) if !self.link.accepts(src) => return,
            Err(DecodeError::UnknownTag(tag)) => {
                self.logger.log(
                    LogEntry::new(LogLevel::Warn, "unknown message tag")
                        .with_field("tag", format!("0x{:02X}", tag))
                        .with_field("src", src),
                );
                return;
            }
            Err(_) => return,
        };

        if self.link.handle(src, &message) || !self.link.accepts(src) {
            return;
        }

        if self.transfer.handle(src, &message) == SessionOutcome::Ignored {
            self.logger.log(
                LogEntry::new(LogLevel::Debug, "ignoring message")
                    .with_field("message", format!("{:?}", message.tag())),
            );
        }
    }
}

type RoboFeedback = (LedIndicator<Box<dyn StatusLed>>, EyesIndicator);

pub struct RoboNode {
    config: NodeConfig,
    clock: Arc<dyn TimerDevice>,
    button: Box<dyn ButtonDevice>,
    gesture: GestureDetector,
    pairing: PairingStateMachine,
    feedback: RoboFeedback,
    executor: Executor,
    slot: Arc<ProgramSlot>,
    receiver: Arc<RoboReceiver>,
    executions: Vec<ExecutionSummary>,
}

impl RoboNode {
    /// Wires the node to its hardware and restores the persisted peer.
    pub fn new(config: NodeConfig, hw: RoboHardware, logger: Logger) -> Self {
        let mut pairing = PairingStateMachine::new(
            PairingRole::Responder,
            config.pairing,
            hw.radio.clone(),
            hw.store,
            hw.clock.clone(),
            hw.delay.clone(),
            logger.child("pairing"),
        );
        let slot = Arc::new(ProgramSlot::new());
        let receiver = Arc::new(RoboReceiver {
            link: pairing.link(),
            transfer: TransferReceiver::new(
                config.transfer,
                slot.clone(),
                hw.radio.clone(),
                logger.child("transfer"),
            ),
            logger: logger.clone(),
        });
        hw.radio.set_receiver(receiver.clone());
        pairing.startup();

        let feedback = (
            LedIndicator::new(hw.led, &config.pairing),
            EyesIndicator::new(hw.eyes.clone(), &config.pairing),
        );
        let executor = Executor::new(
            hw.motor,
            hw.eyes,
            hw.delay,
            config.executor,
            logger.child("executor"),
        );

        Self {
            config,
            clock: hw.clock,
            button: hw.button,
            gesture: GestureDetector::new(config.gesture, false),
            pairing,
            feedback,
            executor,
            slot,
            receiver,
            executions: Vec::new(),
        }
    }

    /// One pass of the main loop. A pending program runs to completion
    /// inside the pass, so the returned sleep starts after it.
    pub fn step(&mut self) -> u64 {
        let now_us = self.clock.now_micros();
        self.gesture.poll_device(self.button.as_ref(), now_us);
        let pairing_requested = self.gesture.take_pairing_request();
        self.pairing.tick(pairing_requested, &mut self.feedback);

        if let Some(program) = self.slot.take() {
            let summary = self.executor.run(&program);
            self.executions.push(summary);
        }

        self.config.idle_tick_ms
    }

    /// Button edge interrupt.
    pub fn button_edge(&self, down: bool) {
        self.gesture
            .shared()
            .on_edge(down, self.clock.now_micros());
    }

    pub fn peer(&self) -> Option<MacAddress> {
        self.pairing.peer()
    }

    pub fn is_pairing(&self) -> bool {
        self.pairing.is_active()
    }

    pub fn request_pairing(&self) {
        self.gesture.request_pairing();
    }

    pub fn unpair(&mut self) {
        self.pairing.unpair();
    }

    /// A program is waiting for the next step.
    pub fn has_pending_program(&self) -> bool {
        self.slot.is_pending()
    }

    pub fn is_receiving(&self) -> bool {
        self.receiver.is_receiving()
    }

    /// Summaries of every program run so far, oldest first.
    pub fn executions(&self) -> &[ExecutionSummary] {
        &self.executions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::{BlockBuilder, BlockType};
    use hal::{DriveDirection, Expression};
    use services_logger::LogCapture;
    use sim_hal::{
        MemoryPairingStore, RecordingEyes, RecordingLed, RecordingMotor, SimAir, SimButton,
        SimClock, SimRadio,
    };

    fn board_addr() -> MacAddress {
        MacAddress::new([0xB0, 0, 0, 0, 0, 1])
    }

    fn robo_addr() -> MacAddress {
        MacAddress::new([0xC0, 0, 0, 0, 0, 2])
    }

    struct Rig {
        air: SimAir,
        clock: Arc<SimClock>,
        board: SimRadio,
        motor: RecordingMotor,
        eyes: RecordingEyes,
        capture: LogCapture,
        node: RoboNode,
    }

    fn rig(store: MemoryPairingStore) -> Rig {
        let air = SimAir::new();
        let clock = Arc::new(SimClock::new());
        let motor = RecordingMotor::new();
        let eyes = RecordingEyes::new();
        let capture = LogCapture::new();
        let board = air.radio(board_addr());
        board.add_peer(robo_addr()).unwrap();
        board.add_peer(MacAddress::BROADCAST).unwrap();
        let node = RoboNode::new(
            NodeConfig::default(),
            RoboHardware {
                radio: Arc::new(air.radio(robo_addr())),
                store: Box::new(store),
                clock: clock.clone(),
                delay: clock.clone(),
                button: Box::new(SimButton::new()),
                led: Box::new(RecordingLed::new()),
                motor: Box::new(motor.clone()),
                eyes: Arc::new(eyes.clone()),
            },
            Logger::new("robo").with_capture(capture.clone()),
        );
        Rig {
            air,
            clock,
            board,
            motor,
            eyes,
            capture,
            node,
        }
    }

    fn send_program(rig: &Rig, kinds: &[BlockType]) {
        let mut builder = BlockBuilder::new([1, 2]);
        let mut messages = vec![LinkMessage::TransferStart {
            count: kinds.len() as u8,
        }];
        for (index, kind) in kinds.iter().enumerate() {
            messages.push(LinkMessage::BlockData {
                index: index as u8,
                block: builder.build(*kind, ""),
            });
        }
        messages.push(LinkMessage::TransferEnd);
        for message in messages {
            rig.board.send(robo_addr(), &message.encode()).unwrap();
        }
        rig.air.deliver_all(4);
    }

    #[test]
    fn test_pairs_when_in_pairing_mode() {
        let mut rig = rig(MemoryPairingStore::new());
        rig.node.request_pairing();
        rig.node.step();
        assert!(rig.node.is_pairing());
        assert_eq!(rig.eyes.expression(), Expression::Surprised);

        rig.board
            .send(
                MacAddress::BROADCAST,
                &LinkMessage::PairRequest {
                    address: board_addr(),
                }
                .encode(),
            )
            .unwrap();
        rig.air.deliver_all(4);
        rig.node.step();

        assert_eq!(rig.node.peer(), Some(board_addr()));
        assert!(!rig.node.is_pairing());
        assert_eq!(rig.eyes.expression(), Expression::Happy);
        assert!(rig
            .air
            .sent_by(robo_addr())
            .contains(&LinkMessage::PairAck {
                address: robo_addr()
            }));
    }

    #[test]
    fn test_executes_received_program() {
        let mut rig = rig(MemoryPairingStore::with_peer(board_addr()));
        send_program(&rig, &[BlockType::Forward, BlockType::Param2, BlockType::End]);
        assert!(rig.node.has_pending_program());
        assert!(rig
            .air
            .sent_by(robo_addr())
            .contains(&LinkMessage::TransferAck { count: 3 }));

        let before = rig.clock.now_ms();
        rig.node.step();
        assert!(!rig.node.has_pending_program());
        assert_eq!(rig.motor.count(DriveDirection::Forward), 2);
        assert_eq!(rig.node.executions().len(), 1);
        assert!(rig.node.executions()[0].stopped_at_end);
        assert!(rig.clock.now_ms() >= before + 2_000);
    }

    #[test]
    fn test_ignores_program_when_unpaired() {
        let mut rig = rig(MemoryPairingStore::new());
        send_program(&rig, &[BlockType::Beep]);
        rig.node.step();
        assert!(rig.node.executions().is_empty());
        assert!(rig.air.sent_by(robo_addr()).is_empty());
        assert!(rig.capture.warnings().is_empty());
    }

    #[test]
    fn test_incomplete_transfer_not_executed() {
        let mut rig = rig(MemoryPairingStore::with_peer(board_addr()));
        rig.board
            .send(robo_addr(), &LinkMessage::TransferStart { count: 2 }.encode())
            .unwrap();
        rig.board
            .send(robo_addr(), &LinkMessage::TransferEnd.encode())
            .unwrap();
        rig.air.deliver_all(4);
        rig.node.step();
        assert!(rig.node.executions().is_empty());
        assert!(rig.capture.contains("incomplete"));
    }

    #[test]
    fn test_unknown_tag_warns() {
        let rig = rig(MemoryPairingStore::with_peer(board_addr()));
        rig.board.send(robo_addr(), &[0x42, 0x00]).unwrap();
        rig.air.deliver_all(4);
        assert_eq!(rig.capture.warnings().len(), 1);
        assert!(rig.capture.contains("unknown message tag"));
    }

    #[test]
    fn test_unknown_tag_from_stranger_is_silent() {
        let rig = rig(MemoryPairingStore::with_peer(board_addr()));
        let stranger = rig.air.radio(MacAddress::new([0xEE, 0, 0, 0, 0, 9]));
        stranger.add_peer(robo_addr()).unwrap();
        stranger.send(robo_addr(), &[0x42, 0x00]).unwrap();
        rig.air.deliver_all(4);
        assert!(rig.capture.warnings().is_empty());
    }

    #[test]
    fn test_unknown_tag_while_unpaired_is_silent() {
        let rig = rig(MemoryPairingStore::new());
        rig.board.send(robo_addr(), &[0x42, 0x00]).unwrap();
        rig.air.deliver_all(4);
        assert!(rig.capture.warnings().is_empty());
    }

    #[test]
    fn test_short_press_does_nothing() {
        let mut rig = rig(MemoryPairingStore::new());
        rig.node.button_edge(true);
        rig.clock.advance_ms(100);
        rig.node.button_edge(false);
        rig.node.step();
        assert!(!rig.node.is_pairing());
    }
}
