//! # Hardware Abstraction Layer (HAL)
//!
//! This crate defines the collaborator traits a board or robot node runs on.
//!
//! ## Philosophy
//!
//! **Devices are collaborators, not globals.**
//!
//! Protocol and interpreter logic never touch a peripheral directly. Every
//! clock read, radio send, flash write and motor command goes through a
//! trait here, so the same logic runs on hardware and in simulation.
//!
//! ## Design Principles
//!
//! 1. **Fire-and-forget actuators**: Motors, eyes and LEDs return nothing the
//!    caller acts on
//! 2. **Explicit send results**: Radio sends return `Result` even though the
//!    protocol layer only logs failures
//! 3. **Asynchronous receive**: Inbound datagrams arrive through a
//!    [`RadioReceiver`] callback that must not block
//! 4. **Testable**: Every trait is small enough to fake in a few lines

pub mod actuators;
pub mod button;
pub mod radio;
pub mod slots;
pub mod store;
pub mod timer;

pub use actuators::{DriveDirection, Expression, EyesDisplay, LookDirection, MotorDriver, StatusLed};
pub use button::ButtonDevice;
pub use radio::{RadioReceiver, RadioTransport, SendError};
pub use slots::{BlockReader, SlotError};
pub use store::{PairingStore, StoreError};
pub use timer::{Delay, TimerDevice};
