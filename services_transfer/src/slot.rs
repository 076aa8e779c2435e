//! One-slot program hand-off

use block_types::Program;
use crossbeam::queue::ArrayQueue;

/// Single pending program between the receive context and the executor.
///
/// Lock-free on both sides: `give` never blocks and never waits on the
/// consumer, it evicts whatever is still pending. Programs leave the slot by
/// value, so a program that is already running cannot be touched by a later
/// `give`.
#[derive(Debug)]
pub struct ProgramSlot {
    pending: ArrayQueue<Program>,
}

impl ProgramSlot {
    pub fn new() -> Self {
        Self {
            pending: ArrayQueue::new(1),
        }
    }

    /// Stores `program`, returning the unconsumed program it replaced.
    pub fn give(&self, program: Program) -> Option<Program> {
        self.pending.force_push(program)
    }

    /// Takes the pending program without waiting.
    pub fn take(&self) -> Option<Program> {
        self.pending.pop()
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

impl Default for ProgramSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block_types::{BlockData, BlockType};
    use std::sync::Arc;
    use std::thread;

    fn program(kind: BlockType) -> Program {
        Program::from_blocks(vec![BlockData::new(kind)]).unwrap()
    }

    #[test]
    fn test_give_then_take() {
        let slot = ProgramSlot::new();
        assert!(slot.give(program(BlockType::Forward)).is_none());
        assert!(slot.is_pending());
        assert_eq!(slot.take(), Some(program(BlockType::Forward)));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_second_give_overwrites() {
        let slot = ProgramSlot::new();
        slot.give(program(BlockType::Forward));
        let replaced = slot.give(program(BlockType::Beep));
        assert_eq!(replaced, Some(program(BlockType::Forward)));
        assert_eq!(slot.take(), Some(program(BlockType::Beep)));
    }

    #[test]
    fn test_running_program_is_unaffected() {
        let slot = ProgramSlot::new();
        slot.give(program(BlockType::Forward));
        let running = slot.take().unwrap();
        slot.give(program(BlockType::Beep));
        assert_eq!(running, program(BlockType::Forward));
        assert!(slot.is_pending());
    }

    #[test]
    fn test_concurrent_gives_keep_one_program() {
        let slot = Arc::new(ProgramSlot::new());
        let producers: Vec<_> = [BlockType::Spin, BlockType::Beep, BlockType::Shake]
            .into_iter()
            .map(|kind| {
                let slot = slot.clone();
                thread::spawn(move || {
                    slot.give(program(kind));
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert!(slot.take().is_some());
        assert_eq!(slot.take(), None);
    }
}
