//! # Daemon Runtime
//!
//! Runs a board and a robot against one simulated radio medium and one
//! virtual clock, driven by a [`Scenario`].
//!
//! ## Scheduling
//!
//! Each node asks for its next pass through the sleep its `step` returns.
//! The daemon steps every node that is due, delivers the frames they sent
//! (and any replies) and then jumps the clock to the earliest due time.
//! Blocking work inside a step (send pacing, program execution) advances
//! the same clock, so the other node simply runs late.

use crate::board::{BoardHardware, BoardNode};
use crate::commands::BoardResponse;
use crate::config::{ConfigError, DaemonConfig};
use crate::robo::{RoboHardware, RoboNode};
use crate::scenario::{NodeId, Scenario, ScenarioError, ScenarioStep};
use block_types::BlockBuilder;
use hal::{PairingStore, TimerDevice};
use link_protocol::MacAddress;
use services_executor::ExecutionSummary;
use services_logger::{LogEntry, LogLevel, Logger};
use sim_hal::{
    FilePairingStore, MemoryPairingStore, RecordingEyes, RecordingLed, RecordingMotor, SimAir,
    SimBlockReader, SimButton, SimClock,
};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub const BOARD_ADDRESS: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0xB0, 0x00, 0x01]);
pub const ROBO_ADDRESS: MacAddress = MacAddress([0x24, 0x6F, 0x28, 0xC0, 0x00, 0x02]);

/// Block slots on the simulated board.
pub const NUM_SLOTS: usize = 2;

/// Delivery rounds after each node pass; enough for request, reply and
/// the reply's reply.
const DELIVERY_ROUNDS: usize = 8;

/// Serial prefix of blocks placed by `insert` steps.
const SLOT_SERIAL_PREFIX: [u8; 2] = [0x5C, 0x01];

/// Runs when no script is given: pair, then send a short program.
pub const DEMO_SCRIPT: &str = "\
# Robot enters pairing mode first, then the board finds it
hold robo 4500ms
hold board 4500ms
wait 1000ms
# Forward twice, beep, stop
compose forward,param2,beep,end
wait 5000ms
";

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Script error: {0}")]
    Script(#[from] ScenarioError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("State directory error: {0}")]
    StateDir(#[from] std::io::Error),

    #[error("Step limit of {0} reached")]
    StepLimit(usize),
}

#[derive(Debug, Clone, Default)]
pub struct DaemonOptions {
    /// Scenario text; the demo script when absent
    pub script: Option<String>,
    pub config: DaemonConfig,
    /// Maximum scheduler passes (0 = unlimited)
    pub max_steps: usize,
    /// Where nodes persist their peer; in memory when absent
    pub state_dir: Option<PathBuf>,
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonSummary {
    pub steps: usize,
    pub elapsed_ms: u64,
    pub board_peer: Option<MacAddress>,
    pub robo_peer: Option<MacAddress>,
    pub frames_sent: usize,
    pub acks_received: usize,
    pub executions: Vec<ExecutionSummary>,
    /// The step limit cut the script short.
    pub stopped_early: bool,
}

impl fmt::Display for DaemonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peer = |peer: Option<MacAddress>| match peer {
            Some(peer) => format!("paired with {}", peer),
            None => "not paired".to_string(),
        };
        writeln!(
            f,
            "ran {} steps over {}ms{}",
            self.steps,
            self.elapsed_ms,
            if self.stopped_early {
                " (step limit reached)"
            } else {
                ""
            }
        )?;
        writeln!(f, "board: {}", peer(self.board_peer))?;
        writeln!(f, "robo: {}", peer(self.robo_peer))?;
        writeln!(
            f,
            "frames sent: {}, programs acknowledged: {}",
            self.frames_sent, self.acks_received
        )?;
        for (index, run) in self.executions.iter().enumerate() {
            writeln!(
                f,
                "program {}: {} blocks dispatched, {}, {} unknown skipped",
                index + 1,
                run.dispatched(),
                if run.stopped_at_end {
                    "stopped at End"
                } else {
                    "ran to completion"
                },
                run.unknown_skipped
            )?;
        }
        Ok(())
    }
}

pub struct Daemon {
    air: SimAir,
    clock: SimClock,
    board: BoardNode,
    robo: RoboNode,
    board_button: SimButton,
    robo_button: SimButton,
    slots: SimBlockReader,
    slot_builder: BlockBuilder,
    motor: RecordingMotor,
    eyes: RecordingEyes,
    script: Scenario,
    board_due_ms: u64,
    robo_due_ms: u64,
    max_steps: usize,
    steps: usize,
    responses: Vec<BoardResponse>,
    logger: Logger,
}

impl Daemon {
    pub fn new(options: DaemonOptions) -> Result<Self, DaemonError> {
        Self::with_logger(options, Logger::new("blocod"))
    }

    /// Node loggers are children of `logger`, so a capture sees everything.
    pub fn with_logger(options: DaemonOptions, logger: Logger) -> Result<Self, DaemonError> {
        let script = Scenario::from_text(options.script.as_deref().unwrap_or(DEMO_SCRIPT))?;
        let (board_store, robo_store) = Self::stores(options.state_dir.as_ref())?;

        let air = SimAir::new();
        let clock = SimClock::new();
        let board_button = SimButton::new();
        let robo_button = SimButton::new();
        let slots = SimBlockReader::new(NUM_SLOTS);
        let motor = RecordingMotor::new();
        let eyes = RecordingEyes::new();

        let board = BoardNode::new(
            options.config.board,
            BoardHardware {
                radio: Arc::new(air.radio(BOARD_ADDRESS)),
                store: board_store,
                clock: Arc::new(clock.clone()),
                delay: Arc::new(clock.clone()),
                button: Box::new(board_button.clone()),
                led: Box::new(RecordingLed::new()),
                slots: Box::new(slots.clone()),
            },
            logger.child("board"),
        );
        let robo = RoboNode::new(
            options.config.robo,
            RoboHardware {
                radio: Arc::new(air.radio(ROBO_ADDRESS)),
                store: robo_store,
                clock: Arc::new(clock.clone()),
                delay: Arc::new(clock.clone()),
                button: Box::new(robo_button.clone()),
                led: Box::new(RecordingLed::new()),
                motor: Box::new(motor.clone()),
                eyes: Arc::new(eyes.clone()),
            },
            logger.child("robo"),
        );

        Ok(Self {
            air,
            clock,
            board,
            robo,
            board_button,
            robo_button,
            slots,
            slot_builder: BlockBuilder::new(SLOT_SERIAL_PREFIX),
            motor,
            eyes,
            script,
            board_due_ms: 0,
            robo_due_ms: 0,
            max_steps: options.max_steps,
            steps: 0,
            responses: Vec::new(),
            logger,
        })
    }

    fn stores(
        state_dir: Option<&PathBuf>,
    ) -> Result<(Box<dyn PairingStore>, Box<dyn PairingStore>), DaemonError> {
        match state_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                Ok((
                    Box::new(FilePairingStore::new(dir.join("board.json"))),
                    Box::new(FilePairingStore::new(dir.join("robo.json"))),
                ))
            }
            None => Ok((
                Box::new(MemoryPairingStore::new()),
                Box::new(MemoryPairingStore::new()),
            )),
        }
    }

    /// Plays the whole script. A step limit ends the run early but still
    /// yields a summary.
    pub fn run(&mut self) -> Result<DaemonSummary, DaemonError> {
        let mut stopped_early = false;
        while let Some(step) = self.script.next_step() {
            match self.execute(step) {
                Ok(()) => {}
                Err(DaemonError::StepLimit(limit)) => {
                    self.logger.log(
                        LogEntry::new(LogLevel::Warn, "step limit reached")
                            .with_field("limit", limit),
                    );
                    stopped_early = true;
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        let mut summary = self.summary();
        summary.stopped_early = stopped_early;
        Ok(summary)
    }

    /// Performs one scripted action.
    pub fn execute(&mut self, step: ScenarioStep) -> Result<(), DaemonError> {
        self.logger.log(
            LogEntry::new(LogLevel::Debug, "scenario step")
                .with_field("step", format!("{:?}", step))
                .with_field("at_ms", self.clock.now_ms()),
        );
        match step {
            ScenarioStep::Hold { node, ms } => self.hold(node, ms)?,
            ScenarioStep::Wait(ms) => self.run_for(ms)?,
            ScenarioStep::Insert { slot, kind, name } => {
                if slot >= NUM_SLOTS {
                    self.logger.log(
                        LogEntry::new(LogLevel::Warn, "no such slot").with_field("slot", slot),
                    );
                } else {
                    let name = name.unwrap_or_else(|| kind.label().to_string());
                    self.slots.insert(slot, self.slot_builder.build(kind, &name));
                }
            }
            ScenarioStep::Remove { slot } => self.slots.remove(slot),
            ScenarioStep::Compose(kinds) => {
                if let Err(err) = self.board.compose_kinds(&kinds) {
                    self.logger.log(
                        LogEntry::new(LogLevel::Warn, "compose failed").with_field("error", err),
                    );
                }
                self.air.deliver_all(DELIVERY_ROUNDS);
            }
            ScenarioStep::Unpair { node } => {
                match node {
                    NodeId::Board => self.board.unpair(),
                    NodeId::Robo => self.robo.unpair(),
                }
                self.air.deliver_all(DELIVERY_ROUNDS);
            }
            ScenarioStep::Command(line) => {
                let response = self.board.handle_command(&line);
                self.logger.log(
                    LogEntry::new(LogLevel::Info, "board response")
                        .with_field("json", response.to_json()),
                );
                self.responses.push(response);
                self.air.deliver_all(DELIVERY_ROUNDS);
            }
        }
        Ok(())
    }

    /// Holds a node's button for `ms`, with the edge interrupt firing on
    /// both transitions.
    pub fn hold(&mut self, node: NodeId, ms: u64) -> Result<(), DaemonError> {
        self.set_button(node, true);
        let result = self.run_for(ms);
        self.set_button(node, false);
        result
    }

    fn set_button(&mut self, node: NodeId, down: bool) {
        let button = match node {
            NodeId::Board => &self.board_button,
            NodeId::Robo => &self.robo_button,
        };
        if down {
            button.press();
        } else {
            button.release();
        }
        match node {
            NodeId::Board => self.board.button_edge(down),
            NodeId::Robo => self.robo.button_edge(down),
        }
    }

    /// Lets both nodes run for `ms` of virtual time.
    pub fn run_for(&mut self, ms: u64) -> Result<(), DaemonError> {
        let until_ms = self.clock.now_ms() + ms;
        loop {
            self.step()?;
            let now = self.clock.now_ms();
            if now >= until_ms {
                return Ok(());
            }
            let next = self.board_due_ms.min(self.robo_due_ms).min(until_ms);
            if next > now {
                self.clock.advance_ms(next - now);
            }
        }
    }

    /// One scheduler pass: every due node steps once.
    pub fn step(&mut self) -> Result<(), DaemonError> {
        if self.max_steps > 0 && self.steps >= self.max_steps {
            return Err(DaemonError::StepLimit(self.max_steps));
        }
        self.steps += 1;

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
        Ok(())
    }

    pub fn summary(&self) -> DaemonSummary {
        DaemonSummary {
            steps: self.steps,
            elapsed_ms: self.clock.now_ms(),
            board_peer: self.board.peer(),
            robo_peer: self.robo.peer(),
            frames_sent: self.air.transcript().len(),
            acks_received: self.board.acks_received(),
            executions: self.robo.executions().to_vec(),
            stopped_early: false,
        }
    }

    pub fn board(&self) -> &BoardNode {
        &self.board
    }

    pub fn robo(&self) -> &RoboNode {
        &self.robo
    }

    pub fn air(&self) -> &SimAir {
        &self.air
    }

    pub fn motor(&self) -> &RecordingMotor {
        &self.motor
    }

    pub fn eyes(&self) -> &RecordingEyes {
        &self.eyes
    }

    /// Replies to every `command` step so far.
    pub fn responses(&self) -> &[BoardResponse] {
        &self.responses
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}
