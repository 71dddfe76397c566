//! Long-lived sensor context for the pod
//!
//! [`SensorSuite`] owns one instance of every driver. The firmware builds it
//! once at boot from a [`SensorHardware`] and passes it to whatever needs a
//! reading.

mod hardware;
mod sensors_state;

pub use hardware::*;
pub use sensors_state::*;
