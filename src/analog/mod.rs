//! Analog-to-digital conversion
//!
//! The ADC is shared between on-demand reads from the main line (radiant
//! temperature, CO) and continuous background conversion of the microphone
//! channel read from the sound timer interrupt. [`SharedAnalog`] arbitrates
//! between the two.

mod engine;

pub use engine::*;

/// Analog input channel number.
pub type Channel = u8;

/// Full-scale count of a conversion (10-bit converter).
pub const RESOLUTION: u16 = 1024;

/// Conversion mode as programmed into the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdcMode {
    /// One conversion per [`AdcPeripheral::start_conversion`] call.
    SingleShot,
    /// Hardware re-triggers conversions of the channel back to back.
    FreeRunning(Channel),
}

/// Minimal view of an ADC peripheral.
///
/// Implementations map these onto the reference/channel select, trigger
/// mode, start bit and conversion-complete flag of a real converter, or onto
/// a simulation. None of the methods may block.
pub trait AdcPeripheral {
    /// Power up the converter and select the reference voltage.
    fn enable(&mut self);

    /// Reprogram the trigger mode. Must leave the enabled state untouched.
    fn set_mode(&mut self, mode: AdcMode);

    /// Mode the hardware is actually configured for, read back from the
    /// peripheral rather than cached.
    fn mode(&self) -> AdcMode;

    /// Start a single conversion of `channel`.
    fn start_conversion(&mut self, channel: Channel);

    /// A conversion is in flight.
    fn is_busy(&self) -> bool;

    /// A result is waiting that has not been read yet.
    fn conversion_complete(&self) -> bool;

    /// Take the latest result and clear the conversion-complete flag.
    fn read_result(&mut self) -> u16;
}
