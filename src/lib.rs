//! Heater control and safety supervision for soldering irons.
//!
//! The [`control::Iron`] turns periodic tip readings into a heater PWM, within the supply's power limit. It manages
//! the operating modes (run, standby, sleep), detects thermal runaway and aggregates sensor faults into a recoverable
//! error state. Boards provide their peripherals through the traits in [`hal`].
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

#[cfg(test)]
extern crate std;

#[macro_use]
mod fmt;

pub mod control;
pub mod hal;
pub mod settings;
pub mod shared;

#[cfg(test)]
mod mock;

pub use control::{FatalError, Iron, Mode, WakeSource};
pub use settings::{Config, TemperatureUnit};
pub use shared::Shared;
