//! Recording actuators and scripted inputs

use block_types::{BlockData, BLOCK_DATA_SIZE};
use hal::{
    BlockReader, ButtonDevice, DriveDirection, Expression, EyesDisplay, LookDirection,
    MotorDriver, SlotError, StatusLed,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorEvent {
    Drive(DriveDirection, u8),
    Stop,
}

/// Motor driver that records every command. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingMotor {
    events: Arc<Mutex<Vec<MotorEvent>>>,
}

impl RecordingMotor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MotorEvent> {
        lock(&self.events).clone()
    }

    /// Directions driven, in order, ignoring speed and stops.
    pub fn drives(&self) -> Vec<DriveDirection> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                MotorEvent::Drive(direction, _) => Some(*direction),
                MotorEvent::Stop => None,
            })
            .collect()
    }

    pub fn count(&self, direction: DriveDirection) -> usize {
        self.drives().iter().filter(|d| **d == direction).count()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl MotorDriver for RecordingMotor {
    fn drive(&mut self, direction: DriveDirection, speed: u8) {
        lock(&self.events).push(MotorEvent::Drive(direction, speed));
    }

    fn stop(&mut self) {
        lock(&self.events).push(MotorEvent::Stop);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyesEvent {
    Expression(Expression),
    Look(LookDirection),
}

/// Eyes that remember what they were shown.
#[derive(Debug, Clone, Default)]
pub struct RecordingEyes {
    events: Arc<Mutex<Vec<EyesEvent>>>,
}

impl RecordingEyes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EyesEvent> {
        lock(&self.events).clone()
    }

    pub fn expression(&self) -> Expression {
        lock(&self.events)
            .iter()
            .rev()
            .find_map(|event| match event {
                EyesEvent::Expression(expression) => Some(*expression),
                EyesEvent::Look(_) => None,
            })
            .unwrap_or(Expression::Normal)
    }

    pub fn look_direction(&self) -> LookDirection {
        lock(&self.events)
            .iter()
            .rev()
            .find_map(|event| match event {
                EyesEvent::Look(direction) => Some(*direction),
                EyesEvent::Expression(_) => None,
            })
            .unwrap_or(LookDirection::Center)
    }

    pub fn has_shown(&self, expression: Expression) -> bool {
        lock(&self.events).contains(&EyesEvent::Expression(expression))
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }
}

impl EyesDisplay for RecordingEyes {
    fn set_expression(&self, expression: Expression) {
        lock(&self.events).push(EyesEvent::Expression(expression));
    }

    fn set_look_direction(&self, direction: LookDirection) {
        lock(&self.events).push(EyesEvent::Look(direction));
    }
}

/// RGB LED with a colour history.
#[derive(Debug, Clone, Default)]
pub struct RecordingLed {
    history: Arc<Mutex<Vec<(u8, u8, u8)>>>,
}

impl RecordingLed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last colour set, black if never set.
    pub fn current(&self) -> (u8, u8, u8) {
        lock(&self.history).last().copied().unwrap_or((0, 0, 0))
    }

    pub fn history(&self) -> Vec<(u8, u8, u8)> {
        lock(&self.history).clone()
    }
}

impl StatusLed for RecordingLed {
    fn set(&mut self, r: u8, g: u8, b: u8) {
        lock(&self.history).push((r, g, b));
    }
}

/// Button whose level a scenario sets directly.
#[derive(Debug, Clone, Default)]
pub struct SimButton {
    down: Arc<AtomicBool>,
}

impl SimButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.down.store(false, Ordering::SeqCst);
    }
}

impl ButtonDevice for SimButton {
    fn is_pressed(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    block: Option<BlockData>,
    fail_reads: bool,
}

/// Block slots a scenario can fill and empty.
#[derive(Debug, Clone)]
pub struct SimBlockReader {
    slots: Arc<Mutex<Vec<Slot>>>,
}

impl SimBlockReader {
    pub fn new(count: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(vec![Slot::default(); count])),
        }
    }

    /// Places a block in a slot. Out of range slots are ignored.
    pub fn insert(&self, slot: usize, block: BlockData) {
        if let Some(entry) = lock(&self.slots).get_mut(slot) {
            entry.block = Some(block);
        }
    }

    /// Places an erased (all 0xFF) record in a slot.
    pub fn insert_blank(&self, slot: usize) {
        self.insert(slot, BlockData::from_array(&[0xFF; BLOCK_DATA_SIZE]));
    }

    pub fn remove(&self, slot: usize) {
        if let Some(entry) = lock(&self.slots).get_mut(slot) {
            entry.block = None;
        }
    }

    /// Makes reads of a present block fail until cleared.
    pub fn set_read_failure(&self, slot: usize, fail: bool) {
        if let Some(entry) = lock(&self.slots).get_mut(slot) {
            entry.fail_reads = fail;
        }
    }
}

impl BlockReader for SimBlockReader {
    fn slot_count(&self) -> usize {
        lock(&self.slots).len()
    }

    fn is_present(&mut self, slot: usize) -> bool {
        lock(&self.slots)
            .get(slot)
            .map(|entry| entry.block.is_some())
            .unwrap_or(false)
    }

    fn read(&mut self, slot: usize) -> Result<BlockData, SlotError> {
        let slots = lock(&self.slots);
        let entry = slots.get(slot).ok_or(SlotError::OutOfRange(slot))?;
        if entry.fail_reads {
            return Err(SlotError::ReadFailed {
                slot,
                reason: "bus error".to_string(),
            });
        }
        entry.block.ok_or(SlotError::Empty(slot))
    }
}
