//! Deterministic fault injection for the simulated radio
//!
//! Faults are applied when a frame is handed to the medium (drop, duplicate,
//! send failure) or when queued frames are delivered (reorder).
//!
//! ## Design Philosophy
//!
//! - **Deterministic**: No randomness; every fault is counted or matched
//! - **Composable**: A plan holds any number of faults
//! - **Test-focused**: Production radios never see this
//!
//! ## Example
//!
//! ```
//! use sim_hal::fault_injection::{LinkFault, LinkFaultPlan};
//! use link_protocol::MessageTag;
//!
//! let plan = LinkFaultPlan::new()
//!     .with_fault(LinkFault::DropNext { count: 2 })
//!     .with_fault(LinkFault::DuplicateMatching { tag: MessageTag::BlockData, count: 1 });
//! ```

use crate::air::Frame;
use link_protocol::{MacAddress, MessageTag};
use std::collections::{HashMap, VecDeque};

/// A fault applied to radio frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFault {
    /// Lose the next N frames from any sender
    DropNext { count: usize },

    /// Lose the next N frames sent by one node
    DropNextFrom { src: MacAddress, count: usize },

    /// Lose the next N frames carrying a given message tag
    DropMatching { tag: MessageTag, count: usize },

    /// Lose every frame carrying a given message tag
    DropAllMatching { tag: MessageTag },

    /// Deliver the next N frames carrying a given tag twice
    DuplicateMatching { tag: MessageTag, count: usize },

    /// Swap the queued frame at `index` with the one at `index + offset`
    /// on the next delivery round
    ReorderWindow { index: usize, offset: usize },

    /// Make the radio reject the next N sends outright
    FailSends { count: usize },
}

/// The faults to apply over a scenario.
#[derive(Debug, Clone, Default)]
pub struct LinkFaultPlan {
    faults: Vec<LinkFault>,
}

impl LinkFaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, fault: LinkFault) -> Self {
        self.faults.push(fault);
        self
    }

    pub fn faults(&self) -> &[LinkFault] {
        &self.faults
    }
}

/// What happens to a frame handed to the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFate {
    Deliver,
    Duplicate,
    Drop,
    Reject,
}

/// Stateful application of a [`LinkFaultPlan`].
#[derive(Debug, Default)]
pub struct LinkFaultInjector {
    drop_next: usize,
    drop_from: HashMap<MacAddress, usize>,
    drop_matching: HashMap<MessageTag, usize>,
    drop_all: Vec<MessageTag>,
    duplicate_matching: HashMap<MessageTag, usize>,
    reorders: Vec<(usize, usize)>,
    fail_sends: usize,
    dropped: usize,
    duplicated: usize,
}

impl LinkFaultInjector {
    pub fn new(plan: LinkFaultPlan) -> Self {
        let mut injector = Self::default();
        for fault in plan.faults {
            match fault {
                LinkFault::DropNext { count } => injector.drop_next += count,
                LinkFault::DropNextFrom { src, count } => {
                    *injector.drop_from.entry(src).or_insert(0) += count;
                }
                LinkFault::DropMatching { tag, count } => {
                    *injector.drop_matching.entry(tag).or_insert(0) += count;
                }
                LinkFault::DropAllMatching { tag } => injector.drop_all.push(tag),
                LinkFault::DuplicateMatching { tag, count } => {
                    *injector.duplicate_matching.entry(tag).or_insert(0) += count;
                }
                LinkFault::ReorderWindow { index, offset } => {
                    injector.reorders.push((index, offset));
                }
                LinkFault::FailSends { count } => injector.fail_sends += count,
            }
        }
        injector
    }

    /// Decides the fate of one frame and consumes any counted fault it hits.
    pub fn classify(&mut self, src: MacAddress, payload: &[u8]) -> FrameFate {
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return FrameFate::Reject;
        }

        if self.drop_next > 0 {
            self.drop_next -= 1;
            self.dropped += 1;
            return FrameFate::Drop;
        }

        if let Some(count) = self.drop_from.get_mut(&src) {
            if *count > 0 {
                *count -= 1;
                self.dropped += 1;
                return FrameFate::Drop;
            }
        }

        let tag = payload.first().copied().and_then(MessageTag::from_u8);
        if let Some(tag) = tag {
            if self.drop_all.contains(&tag) {
                self.dropped += 1;
                return FrameFate::Drop;
            }
            if let Some(count) = self.drop_matching.get_mut(&tag) {
                if *count > 0 {
                    *count -= 1;
                    self.dropped += 1;
                    return FrameFate::Drop;
                }
            }
            if let Some(count) = self.duplicate_matching.get_mut(&tag) {
                if *count > 0 {
                    *count -= 1;
                    self.duplicated += 1;
                    return FrameFate::Duplicate;
                }
            }
        }

        FrameFate::Deliver
    }

    /// Applies pending reorder faults to a delivery round. Each reorder fires
    /// once, on the first round long enough to contain both positions.
    pub fn apply_reordering(&mut self, frames: &mut VecDeque<Frame>) {
        let len = frames.len();
        self.reorders.retain(|(index, offset)| {
            let other = index + offset;
            if other < len {
                frames.swap(*index, other);
                false
            } else {
                true
            }
        });
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn duplicated(&self) -> usize {
        self.duplicated
    }
}
