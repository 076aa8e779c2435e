//! # Board Node
//!
//! The sender: reads physical block slots and sends the resulting program
//! to the paired robot.
//!
//! ## Main loop
//!
//! Each [`BoardNode::step`] is one pass of the board task:
//! 1. Poll the button and run the pairing tick (LED feedback included)
//! 2. While pairing, stop there and come back after `pairing_tick_ms`
//! 3. Serve a pending send request
//! 4. Poll slot presence every `slot_poll_interval_ms`
//!
//! Inbound frames are handled by [`BoardReceiver`] in the radio's receive
//! context, never by the loop.

use crate::commands::{
    BlockReport, BoardCommand, BoardResponse, ComposeBlock, ComposeRequest, SlotReport,
};
use crate::config::NodeConfig;
use crate::NodeError;
use block_types::{BlockBuilder, BlockData, BlockType, Program};
use hal::{
    BlockReader, ButtonDevice, Delay, PairingStore, RadioReceiver, RadioTransport, StatusLed,
    TimerDevice,
};
use link_protocol::{DecodeError, LinkMessage, MacAddress};
use services_button::GestureDetector;
use services_logger::{LogEntry, LogLevel, Logger};
use services_pairing::{LedIndicator, PairingLink, PairingRole, PairingStateMachine};
use services_transfer::{ProgramSender, SendReport, TransferError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Serial prefix for blocks the board composes itself.
const COMPOSE_SERIAL_PREFIX: [u8; 2] = [0xB0, 0xC0];

/// Devices the board runs on.
pub struct BoardHardware {
    pub radio: Arc<dyn RadioTransport>,
    pub store: Box<dyn PairingStore>,
    pub clock: Arc<dyn TimerDevice>,
    pub delay: Arc<dyn Delay>,
    pub button: Box<dyn ButtonDevice>,
    pub led: Box<dyn StatusLed>,
    pub slots: Box<dyn BlockReader>,
}

/// Receive-context handler for the board.
///
/// Pairing messages go to the pairing link; the only other message the
/// board cares about is the robot's program acknowledgement.
pub struct BoardReceiver {
    link: PairingLink,
    acks: AtomicUsize,
    last_ack: Mutex<Option<(MacAddress, u8)>>,
    logger: Logger,
}

impl BoardReceiver {
    fn new(link: PairingLink, logger: Logger) -> Self {
        Self {
            link,
            acks: AtomicUsize::new(0),
            last_ack: Mutex::new(None),
            logger,
        }
    }

    pub fn acks_received(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }

    pub fn last_ack(&self) -> Option<(MacAddress, u8)> {
        *self
            .last_ack
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RadioReceiver for BoardReceiver {
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

        match message {
            LinkMessage::TransferAck { count } => {
                self.acks.fetch_add(1, Ordering::SeqCst);
                *self
                    .last_ack
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((src, count));
                self.logger.log(
                    LogEntry::new(LogLevel::Info, "robot acknowledged program")
                        .with_field("blocks", count),
                );
            }
            other => self.logger.log(
                LogEntry::new(LogLevel::Debug, "ignoring message")
                    .with_field("message", format!("{:?}", other.tag())),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    present: bool,
    data: Option<BlockData>,
}

pub struct BoardNode {
    config: NodeConfig,
    clock: Arc<dyn TimerDevice>,
    button: Box<dyn ButtonDevice>,
    slots: Box<dyn BlockReader>,
    gesture: GestureDetector,
    pairing: PairingStateMachine,
    led: LedIndicator<Box<dyn StatusLed>>,
    sender: ProgramSender,
    receiver: Arc<BoardReceiver>,
    builder: BlockBuilder,
    slot_cache: Vec<SlotState>,
    next_slot_poll_ms: u64,
    logger: Logger,
}

impl BoardNode {
    /// Wires the node to its hardware and restores the persisted peer.
    pub fn new(config: NodeConfig, hw: BoardHardware, logger: Logger) -> Self {
        let mut pairing = PairingStateMachine::new(
            PairingRole::Initiator,
            config.pairing,
            hw.radio.clone(),
            hw.store,
            hw.clock.clone(),
            hw.delay.clone(),
            logger.child("pairing"),
        );
        let receiver = Arc::new(BoardReceiver::new(pairing.link(), logger.clone()));
        hw.radio.set_receiver(receiver.clone());
        pairing.startup();

        let sender = ProgramSender::new(
            hw.radio.clone(),
            hw.delay.clone(),
            config.transfer,
            logger.child("transfer"),
        );
        let slot_count = hw.slots.slot_count();

        Self {
            config,
            clock: hw.clock,
            button: hw.button,
            slots: hw.slots,
            gesture: GestureDetector::new(config.gesture, true),
            pairing,
            led: LedIndicator::new(hw.led, &config.pairing),
            sender,
            receiver,
            builder: BlockBuilder::new(COMPOSE_SERIAL_PREFIX),
            slot_cache: vec![SlotState::default(); slot_count],
            next_slot_poll_ms: 0,
            logger,
        }
    }

    /// One pass of the main loop. Returns the milliseconds to sleep before
    /// the next pass.
    pub fn step(&mut self) -> u64 {
        let now_us = self.clock.now_micros();
        self.gesture.poll_device(self.button.as_ref(), now_us);
        let pairing_requested = self.gesture.take_pairing_request();
        self.pairing.tick(pairing_requested, &mut self.led);

        if self.pairing.is_active() {
            return self.config.pairing_tick_ms;
        }

        if self.gesture.take_send_request() {
            if let Err(err) = self.send_slots() {
                self.logger.log(
                    LogEntry::new(LogLevel::Debug, "send request dropped")
                        .with_field("error", err),
                );
            }
        }

        let now_ms = self.clock.now_ms();
        if now_ms >= self.next_slot_poll_ms {
            self.poll_slots();
            self.next_slot_poll_ms = now_ms + self.config.slot_poll_interval_ms;
        }

        self.config.idle_tick_ms
    }

    /// Button edge interrupt.
    pub fn button_edge(&self, down: bool) {
        self.gesture
            .shared()
            .on_edge(down, self.clock.now_micros());
    }

    /// The program currently sitting in the slots, from the last poll.
    pub fn slot_program(&self) -> Program {
        let mut program = Program::new();
        for block in self.slot_cache.iter().filter_map(|slot| slot.data) {
            if program.push(block).is_err() {
                self.logger.warn("more slots than a program holds, truncating");
                break;
            }
        }
        program
    }

    /// Sends the slot program to the peer.
    pub fn send_slots(&mut self) -> Result<SendReport, TransferError> {
        let program = self.slot_program();
        self.sender.send(self.pairing.peer(), &program)
    }

    /// Builds and sends a program supplied from outside the slots.
    pub fn compose(&mut self, request: &ComposeRequest) -> Result<SendReport, NodeError> {
        let blocks = request.build(&mut self.builder)?;
        Ok(self.sender.send_blocks(self.pairing.peer(), &blocks)?)
    }

    /// Composes a program from bare opcodes, each named by its label.
    pub fn compose_kinds(&mut self, kinds: &[BlockType]) -> Result<SendReport, NodeError> {
        let request = ComposeRequest {
            blocks: kinds
                .iter()
                .map(|kind| ComposeBlock {
                    type_id: kind.as_u8(),
                    name: String::new(),
                })
                .collect(),
        };
        self.compose(&request)
    }

    /// Serves one JSON command line.
    pub fn handle_command(&mut self, line: &str) -> BoardResponse {
        let command = match BoardCommand::parse(line) {
            Ok(command) => command,
            Err(err) => return BoardResponse::error(NodeError::from(err)),
        };

        match command {
            BoardCommand::ScanChannels => BoardResponse::ScanResult { slots: self.scan() },
            BoardCommand::GetStatus => self.status(),
            BoardCommand::SendToRobot | BoardCommand::SendBlocks(_) if self.is_pairing() => {
                BoardResponse::error("pairing in progress")
            }
            BoardCommand::SendToRobot => match self.send_slots() {
                Ok(report) => BoardResponse::SendOk {
                    blocks_sent: report.blocks,
                },
                Err(err) => BoardResponse::error(err),
            },
            BoardCommand::SendBlocks(request) => match self.compose(&request) {
                Ok(report) => BoardResponse::SendOk {
                    blocks_sent: report.blocks,
                },
                Err(err) => BoardResponse::error(err),
            },
        }
    }

    /// Reads every slot afresh.
    pub fn scan(&mut self) -> Vec<SlotReport> {
        (0..self.slots.slot_count())
            .map(|slot| {
                if !self.slots.is_present(slot) {
                    return SlotReport {
                        slot,
                        present: false,
                        block: None,
                        error: None,
                    };
                }
                match self.slots.read(slot) {
                    Ok(block) => SlotReport {
                        slot,
                        present: true,
                        block: Some(BlockReport::from(&block)),
                        error: None,
                    },
                    Err(err) => SlotReport {
                        slot,
                        present: true,
                        block: None,
                        error: Some(err.to_string()),
                    },
                }
            })
            .collect()
    }

    pub fn status(&mut self) -> BoardResponse {
        let num_slots = self.slots.slot_count();
        let blocks_present = (0..num_slots)
            .filter(|&slot| self.slots.is_present(slot))
            .count();
        BoardResponse::Status {
            num_slots,
            blocks_present,
            paired: self.pairing.peer().is_some(),
        }
    }

    pub fn peer(&self) -> Option<MacAddress> {
        self.pairing.peer()
    }

    pub fn is_pairing(&self) -> bool {
        self.pairing.is_active()
    }

    /// Enters pairing mode at the next step, as a long press would.
    pub fn request_pairing(&self) {
        self.gesture.request_pairing();
    }

    /// Sends the slot program at the next step, as a short press would.
    pub fn request_send(&self) {
        self.gesture.request_send();
    }

    pub fn unpair(&mut self) {
        self.pairing.unpair();
    }

    pub fn acks_received(&self) -> usize {
        self.receiver.acks_received()
    }

    pub fn last_ack(&self) -> Option<(MacAddress, u8)> {
        self.receiver.last_ack()
    }

    fn poll_slots(&mut self) {
        for slot in 0..self.slot_cache.len() {
            let present = self.slots.is_present(slot);
            let was_present = self.slot_cache[slot].present;

            if present && !was_present {
                self.slot_cache[slot].data = match self.slots.read(slot) {
                    Ok(block) => {
                        self.log_detected(slot, &block);
                        Some(block)
                    }
                    Err(err) => {
                        self.logger.log(
                            LogEntry::new(LogLevel::Error, "block read failed")
                                .with_field("slot", slot)
                                .with_field("error", err),
                        );
                        None
                    }
                };
            } else if !present && was_present {
                self.logger
                    .log(LogEntry::new(LogLevel::Warn, "block removed").with_field("slot", slot));
                self.slot_cache[slot].data = None;
            }
            self.slot_cache[slot].present = present;
        }
    }

    fn log_detected(&self, slot: usize, block: &BlockData) {
        if block.is_blank() {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "blank block, not programmed")
                    .with_field("slot", slot),
            );
            return;
        }
        let kind = block
            .kind()
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| format!("unknown (0x{:02X})", block.type_id));
        self.logger.log(
            LogEntry::new(LogLevel::Info, "block detected")
                .with_field("slot", slot)
                .with_field("type", kind)
                .with_field("name", block.name_str())
                .with_field("checksum_ok", block.checksum_ok()),
        );
    }
}
