//! # Actuators
//!
//! Motors, the animated eyes and the status LED.
//!
//! ## Design
//!
//! - All commands are fire-and-forget: nothing is returned to the caller
//! - The eyes are shared between the interpreter and pairing feedback, so
//!   [`EyesDisplay`] takes `&self`; rendering is the implementation's concern
//! - Motors and the LED each have a single owner and take `&mut self`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Motion requested from the drive train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriveDirection {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    Spin,
}

/// Facial expression shown by the eyes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    Normal,
    Happy,
    Sad,
    Angry,
    Surprised,
    Sleeping,
    Excited,
    Focused,
}

/// Where the eyes look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookDirection {
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl fmt::Display for DriveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for LookDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

pub trait MotorDriver: Send {
    fn drive(&mut self, direction: DriveDirection, speed: u8);

    fn stop(&mut self);
}

pub trait EyesDisplay: Send + Sync {
    fn set_expression(&self, expression: Expression);

    fn set_look_direction(&self, direction: LookDirection);
}

/// An RGB indicator.
pub trait StatusLed: Send {
    fn set(&mut self, r: u8, g: u8, b: u8);

    fn off(&mut self) {
        self.set(0, 0, 0);
    }
}

impl<T: StatusLed + ?Sized> StatusLed for Box<T> {
    fn set(&mut self, r: u8, g: u8, b: u8) {
        (**self).set(r, g, b);
    }

    fn off(&mut self) {
        (**self).off();
    }
}
