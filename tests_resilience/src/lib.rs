//! Resilience Test Utilities
//!
//! This crate provides a shared testbed for cross-crate scenario tests: one
//! board and one robot on a simulated radio medium, with hooks for faults.
//!
//! ## Test Philosophy
//!
//! - **Safety under faults**: Lost, duplicated and reordered frames never
//!   run a partial program or pair with the wrong node
//! - **Deterministic failures**: All faults are reproducible via
//!   `LinkFaultPlan`
//! - **Observable**: Every actuator and log line is recorded, so a test
//!   asserts on what the robot actually did

use blocod::{BoardHardware, BoardNode, DaemonConfig, NodeError, RoboHardware, RoboNode};
use block_types::{BlockBuilder, BlockType, Program};
use hal::{PairingStore, RadioTransport, TimerDevice};
use link_protocol::{LinkMessage, MacAddress};
use services_logger::{LogCapture, Logger};
use services_transfer::SendReport;
use sim_hal::{
    LinkFaultPlan, MemoryPairingStore, RecordingEyes, RecordingLed, RecordingMotor, SimAir,
    SimBlockReader, SimButton, SimClock, SimRadio,
};
use std::sync::Arc;

pub const BOARD: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0xB0, 0x00, 0x01]);
pub const ROBO: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0xC0, 0x00, 0x02]);
/// A third node that never paired with anyone.
pub const STRANGER: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0xEE, 0x00, 0x09]);

const DELIVERY_ROUNDS: usize = 8;

/// A board and a robot sharing one medium and one clock.
pub struct Testbed {
    pub air: SimAir,
    pub clock: SimClock,
    pub board: BoardNode,
    pub robo: RoboNode,
    pub slots: SimBlockReader,
    pub motor: RecordingMotor,
    pub eyes: RecordingEyes,
    pub board_led: RecordingLed,
    pub robo_led: RecordingLed,
    pub capture: LogCapture,
    board_due_ms: u64,
    robo_due_ms: u64,
}

impl Testbed {
    /// Unpaired nodes with default configuration and volatile stores.
    pub fn new() -> Self {
        Self::build(
            DaemonConfig::default(),
            Box::new(MemoryPairingStore::new()),
            Box::new(MemoryPairingStore::new()),
        )
    }

    pub fn with_config(config: DaemonConfig) -> Self {
        Self::build(
            config,
            Box::new(MemoryPairingStore::new()),
            Box::new(MemoryPairingStore::new()),
        )
    }

    pub fn build(
        config: DaemonConfig,
        board_store: Box<dyn PairingStore>,
        robo_store: Box<dyn PairingStore>,
    ) -> Self {
        let air = SimAir::new();
        let clock = SimClock::new();
        let slots = SimBlockReader::new(2);
        let motor = RecordingMotor::new();
        let eyes = RecordingEyes::new();
        let board_led = RecordingLed::new();
        let robo_led = RecordingLed::new();
        let capture = LogCapture::new();

        let board = BoardNode::new(
            config.board,
            BoardHardware {
                radio: Arc::new(air.radio(BOARD)),
                store: board_store,
                clock: Arc::new(clock.clone()),
                delay: Arc::new(clock.clone()),
                button: Box::new(SimButton::new()),
                led: Box::new(board_led.clone()),
                slots: Box::new(slots.clone()),
            },
            Logger::new("board").with_capture(capture.clone()),
        );
        let robo = RoboNode::new(
            config.robo,
            RoboHardware {
                radio: Arc::new(air.radio(ROBO)),
                store: robo_store,
                clock: Arc::new(clock.clone()),
                delay: Arc::new(clock.clone()),
                button: Box::new(SimButton::new()),
                led: Box::new(robo_led.clone()),
                motor: Box::new(motor.clone()),
                eyes: Arc::new(eyes.clone()),
            },
            Logger::new("robo").with_capture(capture.clone()),
        );

        Self {
            air,
            clock,
            board,
            robo,
            slots,
            motor,
            eyes,
            board_led,
            robo_led,
            capture,
            board_due_ms: 0,
            robo_due_ms: 0,
        }
    }

    pub fn set_faults(&self, plan: LinkFaultPlan) {
        self.air.set_fault_plan(plan);
    }

    /// Steps whichever nodes are due, delivering after each.
    pub fn step(&mut self) {
        if self.clock.now_ms() >= self.board_due_ms {
            let sleep_ms = self.board.step();
            self.air.deliver_all(DELIVERY_ROUNDS);
            self.board_due_ms = self.clock.now_ms() + sleep_ms;
        }
        if self.clock.now_ms() >= self.robo_due_ms {
            let sleep_ms = self.robo.step();
            self.air.deliver_all(DELIVERY_ROUNDS);
            self.robo_due_ms = self.clock.now_ms() + sleep_ms;
        }
    }

    /// Runs both main loops for `ms` of virtual time.
    pub fn run_for(&mut self, ms: u64) {
        let until_ms = self.clock.now_ms() + ms;
        loop {
            self.step();
            let now = self.clock.now_ms();
            if now >= until_ms {
                return;
            }
            let next = self.board_due_ms.min(self.robo_due_ms).min(until_ms);
            if next > now {
                self.clock.advance_ms(next - now);
            }
        }
    }

    /// Puts the robot and then the board into pairing mode and lets the
    /// handshake finish.
    pub fn pair(&mut self) {
        self.robo.request_pairing();
        self.run_for(200);
        self.board.request_pairing();
        self.run_for(500);
    }

    /// Sends a freshly built program from the board and delivers it.
    pub fn send_kinds(&mut self, kinds: &[BlockType]) -> Result<SendReport, NodeError> {
        let report = self.board.compose_kinds(kinds);
        self.air.deliver_all(DELIVERY_ROUNDS);
        report
    }

    /// Attaches a radio for [`STRANGER`] that may unicast to both nodes.
    pub fn stranger(&self) -> SimRadio {
        let radio = self.air.radio(STRANGER);
        for peer in [BOARD, ROBO, MacAddress::BROADCAST] {
            // A fresh node's peer table cannot be full.
            let _ = radio.add_peer(peer);
        }
        radio
    }

    /// Sends one message from the stranger to `dest` and delivers it.
    pub fn stranger_send(&self, dest: MacAddress, message: &LinkMessage) {
        let radio = self.stranger();
        let _ = radio.send(dest, &message.encode());
        self.air.deliver_all(DELIVERY_ROUNDS);
    }
}

impl Default for Testbed {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a sealed program from opcodes.
pub fn program(kinds: &[BlockType]) -> Program {
    let mut builder = BlockBuilder::new([0x7E, 0x57]);
    let blocks = kinds.iter().map(|kind| builder.build(*kind, "")).collect();
    Program::from_blocks(blocks).unwrap_or_default()
}
