//! Block interpreter

use crate::ExecutorTiming;
use block_types::{BlockCategory, BlockData, BlockType, Program};
use hal::{Delay, DriveDirection, Expression, EyesDisplay, LookDirection, MotorDriver};
use services_logger::{LogEntry, LogLevel, Logger};
use std::sync::Arc;

/// Repeat count resolved by parameter lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatCount {
    Times(u32),
    Forever,
}

impl RepeatCount {
    fn from_param(param: Option<u32>) -> Self {
        match param {
            Some(n) => RepeatCount::Times(n),
            None => RepeatCount::Forever,
        }
    }
}

impl std::fmt::Display for RepeatCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepeatCount::Times(n) => write!(f, "{}", n),
            RepeatCount::Forever => write!(f, "forever"),
        }
    }
}

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    /// Type bytes of every dispatched block, loop bodies expanded, consumed
    /// parameters excluded.
    pub trace: Vec<u8>,
    /// The top-level sequence ended at an `End` block.
    pub stopped_at_end: bool,
    pub unknown_skipped: usize,
}

impl ExecutionSummary {
    pub fn dispatched(&self) -> usize {
        self.trace.len()
    }

    /// How many times `kind` was dispatched.
    pub fn count(&self, kind: BlockType) -> usize {
        self.trace.iter().filter(|t| **t == kind.as_u8()).count()
    }
}

/// Executes programs against the robot's actuators.
pub struct Executor {
    motor: Box<dyn MotorDriver>,
    eyes: Arc<dyn EyesDisplay>,
    delay: Arc<dyn Delay>,
    timing: ExecutorTiming,
    logger: Logger,
}

impl Executor {
    pub fn new(
        motor: Box<dyn MotorDriver>,
        eyes: Arc<dyn EyesDisplay>,
        delay: Arc<dyn Delay>,
        timing: ExecutorTiming,
        logger: Logger,
    ) -> Self {
        Self {
            motor,
            eyes,
            delay,
            timing,
            logger,
        }
    }

    pub fn timing(&self) -> &ExecutorTiming {
        &self.timing
    }

    /// Runs `program` to completion or to its first top-level `End`.
    pub fn run(&mut self, program: &Program) -> ExecutionSummary {
        self.logger.log(
            LogEntry::new(LogLevel::Info, "executing program").with_field("blocks", program.len()),
        );
        let mut summary = ExecutionSummary::default();
        summary.stopped_at_end = self.run_blocks(program.blocks(), &mut summary);
        self.logger.log(
            LogEntry::new(LogLevel::Info, "program finished")
                .with_field("dispatched", summary.dispatched())
                .with_field("unknown", summary.unknown_skipped),
        );
        summary
    }

    /// Interprets one sequence. Returns true when it stopped at `End`.
    fn run_blocks(&mut self, blocks: &[BlockData], summary: &mut ExecutionSummary) -> bool {
        let mut pc = 0;
        while pc < blocks.len() {
            let block = &blocks[pc];
            summary.trace.push(block.type_id);
            self.logger.log(
                LogEntry::new(LogLevel::Info, "block")
                    .with_field("pc", pc)
                    .with_field("type", format!("0x{:02X}", block.type_id))
                    .with_field("name", block.name_str()),
            );

            match block.kind() {
                Some(BlockType::End) => {
                    self.logger.info("program end");
                    self.reset();
                    return true;
                }
                Some(BlockType::Repeat) => {
                    let count = lookahead(blocks, &mut pc);
                    pc = self.repeat(blocks, pc + 1, count, summary);
                }
                Some(kind) => self.dispatch(kind, blocks, &mut pc),
                None => {
                    summary.unknown_skipped += 1;
                    self.logger.log(
                        LogEntry::new(LogLevel::Warn, "unknown block type, skipping")
                            .with_field("type", format!("0x{:02X}", block.type_id)),
                    );
                }
            }
            pc += 1;
        }

        self.reset();
        false
    }

    /// Runs the body starting at `start` and returns the index of its
    /// matching `EndRepeat` (or the sequence length when there is none).
    fn repeat(
        &mut self,
        blocks: &[BlockData],
        start: usize,
        count: RepeatCount,
        summary: &mut ExecutionSummary,
    ) -> usize {
        let end = matching_end(blocks, start);
        let iterations = match count {
            RepeatCount::Times(n) => n,
            RepeatCount::Forever => self.timing.forever_loop_iterations,
        };
        self.logger.log(
            LogEntry::new(LogLevel::Info, "repeat")
                .with_field("count", count)
                .with_field("body", end - start),
        );

        let body = &blocks[start..end];
        if !body.is_empty() {
            for _ in 0..iterations {
                // An End inside the body only ends this iteration.
                self.run_blocks(body, summary);
            }
        }
        end
    }

    fn dispatch(&mut self, kind: BlockType, blocks: &[BlockData], pc: &mut usize) {
        let speed = self.timing.default_speed;
        match kind {
            BlockType::Begin => self.eyes.set_expression(Expression::Focused),

            BlockType::Forward | BlockType::Backward | BlockType::TurnRight | BlockType::TurnLeft => {
                let count = lookahead(blocks, pc);
                let direction = match kind {
                    BlockType::Forward => {
                        self.eyes.set_expression(Expression::Focused);
                        self.eyes.set_look_direction(LookDirection::Up);
                        DriveDirection::Forward
                    }
                    BlockType::Backward => {
                        self.eyes.set_expression(Expression::Focused);
                        self.eyes.set_look_direction(LookDirection::Down);
                        DriveDirection::Backward
                    }
                    BlockType::TurnRight => {
                        self.eyes.set_look_direction(LookDirection::Right);
                        DriveDirection::TurnRight
                    }
                    _ => {
                        self.eyes.set_look_direction(LookDirection::Left);
                        DriveDirection::TurnLeft
                    }
                };
                self.logger.log(
                    LogEntry::new(LogLevel::Info, "move")
                        .with_field("direction", direction)
                        .with_field("count", count),
                );
                self.drive(direction, count);
            }

            BlockType::Shake => {
                self.eyes.set_expression(Expression::Excited);
                for _ in 0..self.timing.shake_cycles {
                    self.motor.drive(DriveDirection::TurnLeft, speed);
                    self.delay.delay_ms(self.timing.shake_cycle_ms);
                    self.motor.drive(DriveDirection::TurnRight, speed);
                    self.delay.delay_ms(self.timing.shake_cycle_ms);
                }
                self.motor.stop();
            }

            BlockType::Spin => {
                self.eyes.set_expression(Expression::Surprised);
                self.motor.drive(DriveDirection::Spin, speed);
                self.delay.delay_ms(self.timing.spin_ms);
                self.motor.stop();
            }

            // Reached only when no Repeat consumed it.
            BlockType::EndRepeat => {}

            BlockType::If | BlockType::EndIf => self.logger.info("conditional not supported, skipping"),

            BlockType::Beep => {
                self.eyes.set_expression(Expression::Happy);
                self.delay.delay_ms(self.timing.beep_ms);
            }

            BlockType::Sing
            | BlockType::PlayTriangle
            | BlockType::PlayCircle
            | BlockType::PlaySquare => {
                self.eyes.set_expression(Expression::Happy);
                self.delay.delay_ms(self.timing.sound_ms);
            }

            BlockType::WhiteLightOn | BlockType::RedLightOn | BlockType::BlueLightOn => {
                self.logger.log(
                    LogEntry::new(LogLevel::Info, "light, no led fitted")
                        .with_field("block", kind),
                );
            }

            BlockType::WaitForClap => {
                self.eyes.set_expression(Expression::Surprised);
                self.delay.delay_ms(self.timing.wait_for_clap_ms);
            }

            // Handled in run_blocks.
            BlockType::End | BlockType::Repeat => {}

            other => match other.category() {
                BlockCategory::Expression => {
                    if let Some(expression) = expression_for(other) {
                        self.eyes.set_expression(expression);
                    }
                    self.delay.delay_ms(self.timing.eyes_hold_ms);
                }
                BlockCategory::LookDirection => {
                    if let Some(direction) = look_for(other) {
                        self.eyes.set_look_direction(direction);
                    }
                    self.delay.delay_ms(self.timing.eyes_hold_ms);
                }
                BlockCategory::Parameter => self.logger.log(
                    LogEntry::new(LogLevel::Debug, "standalone parameter ignored")
                        .with_field("block", other),
                ),
                BlockCategory::Sensor => self.logger.log(
                    LogEntry::new(LogLevel::Debug, "sensor placeholder").with_field("block", other),
                ),
                _ => {}
            },
        }
    }

    fn drive(&mut self, direction: DriveDirection, count: RepeatCount) {
        let speed = self.timing.default_speed;
        match count {
            RepeatCount::Forever => {
                self.motor.drive(direction, speed);
                self.delay.delay_ms(self.timing.forever_move_ms);
                self.motor.stop();
            }
            RepeatCount::Times(n) => {
                for i in 0..n {
                    self.motor.drive(direction, speed);
                    self.delay.delay_ms(self.timing.move_ms);
                    self.motor.stop();
                    if i + 1 < n {
                        self.delay.delay_ms(self.timing.pause_between_reps_ms);
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.motor.stop();
        self.eyes.set_expression(Expression::Normal);
        self.eyes.set_look_direction(LookDirection::Center);
    }
}

/// Consumes a count parameter following `*pc`, if there is one.
fn lookahead(blocks: &[BlockData], pc: &mut usize) -> RepeatCount {
    let param = blocks
        .get(*pc + 1)
        .and_then(BlockData::kind)
        .and_then(BlockType::repeat_param);
    match param {
        Some(param) => {
            *pc += 1;
            RepeatCount::from_param(param)
        }
        None => RepeatCount::Times(1),
    }
}

/// Index of the `EndRepeat` closing a body that starts at `start`.
fn matching_end(blocks: &[BlockData], start: usize) -> usize {
    let mut depth = 1usize;
    for (i, block) in blocks.iter().enumerate().skip(start) {
        match block.kind() {
            Some(BlockType::Repeat) => depth += 1,
            Some(BlockType::EndRepeat) => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    blocks.len()
}

fn expression_for(kind: BlockType) -> Option<Expression> {
    Some(match kind {
        BlockType::EyesNormal => Expression::Normal,
        BlockType::EyesHappy => Expression::Happy,
        BlockType::EyesSad => Expression::Sad,
        BlockType::EyesAngry => Expression::Angry,
        BlockType::EyesSurprised => Expression::Surprised,
        BlockType::EyesSleeping => Expression::Sleeping,
        BlockType::EyesExcited => Expression::Excited,
        BlockType::EyesFocused => Expression::Focused,
        _ => return None,
    })
}

fn look_for(kind: BlockType) -> Option<LookDirection> {
    Some(match kind {
        BlockType::EyesLookCenter => LookDirection::Center,
        BlockType::EyesLookLeft => LookDirection::Left,
        BlockType::EyesLookRight => LookDirection::Right,
        BlockType::EyesLookUp => LookDirection::Up,
        BlockType::EyesLookDown => LookDirection::Down,
        _ => return None,
    })
}
