//! # Program Executor
//!
//! Runs a received [`Program`](block_types::Program) against the robot's
//! motors and eyes.
//!
//! ## Philosophy
//!
//! - **Blocking**: Each action occupies the executor for its real duration;
//!   there is no yielding mid-program
//! - **Tolerant**: Unknown opcodes are logged and skipped, never fatal
//! - **Bounded**: "Forever" means a long, finite run
//! - **Traceable**: Every run returns an [`ExecutionSummary`] with the
//!   dispatched opcodes in order
//!
//! ## Control flow
//!
//! - An action block may be followed by one count parameter (`2`, `3`, `4`
//!   or forever) which is consumed as its repeat count
//! - `Repeat` resolves a count the same way, finds its matching `EndRepeat`
//!   by nesting depth and runs the body that many times, recursively
//! - `End` stops and resets immediately; so does running off the end

pub mod interpreter;

pub use interpreter::{ExecutionSummary, Executor, RepeatCount};

use serde::{Deserialize, Serialize};

/// Action durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorTiming {
    /// One repetition of a movement block.
    pub move_ms: u64,
    pub pause_between_reps_ms: u64,
    /// A movement with the forever parameter.
    pub forever_move_ms: u64,
    /// Iterations of a forever `Repeat`.
    pub forever_loop_iterations: u32,
    pub spin_ms: u64,
    /// Each half of a shake cycle.
    pub shake_cycle_ms: u64,
    pub shake_cycles: u32,
    pub beep_ms: u64,
    pub sound_ms: u64,
    pub wait_for_clap_ms: u64,
    /// How long an eyes block holds before the next block.
    pub eyes_hold_ms: u64,
    pub default_speed: u8,
}

impl Default for ExecutorTiming {
    fn default() -> Self {
        Self {
            move_ms: 1_000,
            pause_between_reps_ms: 100,
            forever_move_ms: 30_000,
            forever_loop_iterations: 1_000,
            spin_ms: 2_000,
            shake_cycle_ms: 300,
            shake_cycles: 4,
            beep_ms: 200,
            sound_ms: 500,
            wait_for_clap_ms: 2_000,
            eyes_hold_ms: 1_000,
            default_speed: 200,
        }
    }
}
