//! # Simulated Hardware
//!
//! Deterministic implementations of every `hal` trait.
//!
//! ## Purpose
//!
//! Lets a board and a robot run against each other inside `cargo test`:
//! - Time only moves when a test or a [`SimClock`] delay moves it
//! - The radio medium is an in-process queue that delivers on demand
//! - Faults (loss, duplication, reordering, send failures) are scripted,
//!   never random
//! - Every actuator records what it was told to do
//!
//! ## Philosophy
//!
//! **Testability is a first-class design constraint.**
//!
//! These are not mocks that return canned answers. The simulated radio
//! enforces peer registration and payload limits exactly like the real one,
//! so protocol bugs show up here first.

pub mod air;
pub mod clock;
pub mod devices;
pub mod fault_injection;
pub mod store;

pub use air::{Frame, SimAir, SimRadio};
pub use clock::SimClock;
pub use devices::{
    EyesEvent, MotorEvent, RecordingEyes, RecordingLed, RecordingMotor, SimBlockReader, SimButton,
};
pub use fault_injection::{FrameFate, LinkFault, LinkFaultInjector, LinkFaultPlan};
pub use store::{FilePairingStore, MemoryPairingStore};
