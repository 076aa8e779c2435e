//! Receiver-side accumulation of one transfer

use crate::ReceivedCounting;
use block_types::{BlockData, Program, MAX_BLOCKS};
use link_protocol::LinkMessage;
use services_logger::{LogEntry, LogLevel, Logger};

/// Result of feeding one message to a [`TransferSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Not a transfer message, or not acceptable in the current state.
    Ignored,
    Started { expected: usize },
    Stored { index: usize },
    /// The whole program arrived; hand it to the executor and ack `expected`.
    Completed { program: Program, expected: usize },
    /// `TransferEnd` arrived short; the partial program was dropped.
    Discarded { received: usize, expected: usize },
}

/// State of the transfer currently being received.
///
/// Lives in the radio receive context only; the executor never sees it.
#[derive(Debug)]
pub struct TransferSession {
    counting: ReceivedCounting,
    expected: usize,
    received: usize,
    slots: [Option<BlockData>; MAX_BLOCKS],
    in_progress: bool,
    logger: Logger,
}

impl TransferSession {
    pub fn new(counting: ReceivedCounting, logger: Logger) -> Self {
        Self {
            counting,
            expected: 0,
            received: 0,
            slots: [None; MAX_BLOCKS],
            in_progress: false,
            logger,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Accepted `BlockData` messages, duplicates included.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Distinct indices written so far.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn handle(&mut self, message: &LinkMessage) -> SessionOutcome {
        match message {
            LinkMessage::TransferStart { count } => self.start(*count as usize),
            LinkMessage::BlockData { index, block } => self.store(*index as usize, *block),
            LinkMessage::TransferEnd => self.end(),
            _ => SessionOutcome::Ignored,
        }
    }

    fn start(&mut self, count: usize) -> SessionOutcome {
        if self.in_progress {
            self.logger.log(
                LogEntry::new(LogLevel::Debug, "restarting transfer")
                    .with_field("received", self.received),
            );
        }

        self.expected = count;
        if count > MAX_BLOCKS {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "program too large, capping")
                    .with_field("count", count)
                    .with_field("max", MAX_BLOCKS),
            );
            self.expected = MAX_BLOCKS;
        }
        self.received = 0;
        self.slots = [None; MAX_BLOCKS];
        self.in_progress = true;

        self.logger.log(
            LogEntry::new(LogLevel::Info, "program start").with_field("expecting", self.expected),
        );
        SessionOutcome::Started {
            expected: self.expected,
        }
    }

    fn store(&mut self, index: usize, block: BlockData) -> SessionOutcome {
        if !self.in_progress || index >= MAX_BLOCKS {
            return SessionOutcome::Ignored;
        }
        self.slots[index] = Some(block);
        self.received += 1;
        self.logger.log(
            LogEntry::new(LogLevel::Info, "received block")
                .with_field("index", index)
                .with_field("type", format!("0x{:02X}", block.type_id))
                .with_field("name", block.name_str()),
        );
        SessionOutcome::Stored { index }
    }

    fn end(&mut self) -> SessionOutcome {
        if !self.in_progress {
            return SessionOutcome::Ignored;
        }
        self.in_progress = false;

        let filled = self.filled();
        self.logger.log(
            LogEntry::new(LogLevel::Info, "program end")
                .with_field("received", self.received)
                .with_field("expected", self.expected),
        );
        if filled != self.received {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "duplicate block indices")
                    .with_field("messages", self.received)
                    .with_field("distinct", filled),
            );
        }

        let counted = match self.counting {
            ReceivedCounting::MessagesAccepted => self.received,
            ReceivedCounting::DistinctSlots => filled,
        };
        if counted < self.expected {
            self.logger.log(
                LogEntry::new(LogLevel::Warn, "incomplete program, discarding")
                    .with_field("received", counted)
                    .with_field("expected", self.expected),
            );
            return SessionOutcome::Discarded {
                received: counted,
                expected: self.expected,
            };
        }

        // A raw message count can reach `expected` with holes left by
        // duplicates; a hole becomes a zeroed record the interpreter skips.
        let blocks = self.slots[..self.expected]
            .iter()
            .map(|slot| slot.unwrap_or_else(|| BlockData::from_raw_type(0)))
            .collect();
        match Program::from_blocks(blocks) {
            Ok(program) => SessionOutcome::Completed {
                program,
                expected: self.expected,
            },
            Err(err) => {
                self.logger.log(
                    LogEntry::new(LogLevel::Error, "could not assemble program")
                        .with_field("error", err),
                );
                SessionOutcome::Discarded {
                    received: counted,
                    expected: self.expected,
                }
            }
        }
    }
}
