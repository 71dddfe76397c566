//! Hardware handed to the sensor suite
//!
//! The board support code owns the peripherals. It wraps the I2C bus in a
//! `RefCell`, keeps the ADC and the sound state in statics so the timer
//! interrupt can reach them, and passes everything here in one container.

use core::cell::RefCell;

use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;

use crate::analog::SharedAnalog;
use crate::sensors::SoundState;

/// One handle on the shared I2C bus per device.
pub struct I2cDevices<'a, B> {
    pub light: RefCellDevice<'a, B>,
    pub climate: RefCellDevice<'a, B>,
    pub particulate: RefCellDevice<'a, B>,
}

/// Split the bus between the light, climate and particulate sensors.
///
/// The drivers never hold the bus across calls, so the `RefCell` borrow
/// cannot fail.
pub fn share_i2c_bus<B: I2c>(bus: &RefCell<B>) -> I2cDevices<'_, B> {
    I2cDevices {
        light: RefCellDevice::new(bus),
        climate: RefCellDevice::new(bus),
        particulate: RefCellDevice::new(bus),
    }
}

/// Everything the sensor suite needs from the board.
pub struct SensorHardware<'a, B, A, T, S, P, D, C> {
    pub i2c: &'a RefCell<B>,
    pub analog: &'a SharedAnalog<A>,
    pub sound: &'a SoundState,
    /// Periodic timer driving the sound sampler.
    pub sample_timer: T,
    /// Software serial port wired to the CO2 sensor.
    pub co2_serial: S,
    /// Load switch enable for the particulate sensor.
    pub particulate_enable: P,
    pub delay: D,
    pub clock: C,
}
