//! Sensor acquisition layer for the PODD environmental monitoring device
//!
//! Drives the pod's sensors (ambient light, sound level, temperature/humidity,
//! radiant temperature, CO2, CO and particulate matter) over analog, I2C and
//! software-serial transports, and exposes uniform probe/read operations to
//! the firmware's control loop.
//!
//! It is `#![no_std]` so it compiles on the embedded target; tests run on the
//! host against simulated peripherals.

#![cfg_attr(not(test), no_std)]

pub mod analog;
pub mod app_state;
pub mod config;
pub mod error;
pub mod sensors;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

pub use error::SensorError;
