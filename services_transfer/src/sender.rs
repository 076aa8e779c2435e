//! Board-side emission of a program

use crate::TransferConfig;
use block_types::{BlockData, Program, MAX_BLOCKS};
use hal::{Delay, RadioTransport};
use link_protocol::{LinkMessage, MacAddress};
use services_logger::{LogEntry, LogLevel, Logger};
use std::sync::Arc;
use thiserror::Error;

/// Reasons a program is not sent at all.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("not paired")]
    NotPaired,

    #[error("no blocks to send")]
    EmptyProgram,

    #[error("program has {0} blocks, at most {MAX_BLOCKS} allowed")]
    TooLong(usize),
}

/// What went out on the air for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendReport {
    pub blocks: usize,
    /// Messages the radio accepted.
    pub sent: usize,
    /// Messages the radio refused; they are not retried.
    pub failed: usize,
}

/// Serializes programs to the paired peer.
pub struct ProgramSender {
    radio: Arc<dyn RadioTransport>,
    delay: Arc<dyn Delay>,
    config: TransferConfig,
    logger: Logger,
}

impl ProgramSender {
    pub fn new(
        radio: Arc<dyn RadioTransport>,
        delay: Arc<dyn Delay>,
        config: TransferConfig,
        logger: Logger,
    ) -> Self {
        Self {
            radio,
            delay,
            config,
            logger,
        }
    }

    /// Sends a loose block list, checking it fits in one transfer.
    pub fn send_blocks(
        &self,
        peer: Option<MacAddress>,
        blocks: &[BlockData],
    ) -> Result<SendReport, TransferError> {
        if blocks.len() > MAX_BLOCKS {
            return Err(TransferError::TooLong(blocks.len()));
        }
        let program =
            Program::from_blocks(blocks.to_vec()).map_err(|_| TransferError::TooLong(blocks.len()))?;
        self.send(peer, &program)
    }

    /// Sends `program` to `peer`.
    ///
    /// Blocks the caller for roughly `(len + 1) * inter_message_delay_ms`.
    pub fn send(
        &self,
        peer: Option<MacAddress>,
        program: &Program,
    ) -> Result<SendReport, TransferError> {
        let Some(peer) = peer else {
            self.logger.warn("not paired, cannot send program");
            return Err(TransferError::NotPaired);
        };
        if program.is_empty() {
            self.logger.warn("no blocks to send");
            return Err(TransferError::EmptyProgram);
        }

        self.logger.log(
            LogEntry::new(LogLevel::Info, "sending program")
                .with_field("blocks", program.len())
                .with_field("peer", peer),
        );

        let mut report = SendReport {
            blocks: program.len(),
            ..SendReport::default()
        };

        self.emit(
            peer,
            &LinkMessage::TransferStart {
                count: program.len() as u8,
            },
            &mut report,
        );
        self.delay.delay_ms(self.config.inter_message_delay_ms);

        for (index, block) in program.iter().enumerate() {
            self.emit(
                peer,
                &LinkMessage::BlockData {
                    index: index as u8,
                    block: *block,
                },
                &mut report,
            );
            self.delay.delay_ms(self.config.inter_message_delay_ms);
        }

        self.emit(peer, &LinkMessage::TransferEnd, &mut report);

        self.logger.log(
            LogEntry::new(LogLevel::Info, "program sent")
                .with_field("sent", report.sent)
                .with_field("failed", report.failed),
        );
        Ok(report)
    }

    fn emit(&self, peer: MacAddress, message: &LinkMessage, report: &mut SendReport) {
        match self.radio.send(peer, &message.encode()) {
            Ok(()) => report.sent += 1,
            Err(err) => {
                report.failed += 1;
                self.logger.log(
                    LogEntry::new(LogLevel::Warn, "send failed")
                        .with_field("message", format!("{:?}", message.tag()))
                        .with_field("error", err),
                );
            }
        }
    }
}
