//! Globe thermometer for radiant temperature
//!
//! A PR222J2 thermistor sits in the lower leg of a divider with a 10 kΩ
//! resistor to the reference voltage. The analog reading is inverted to the
//! thermistor resistance and run through a curve fit of inverse absolute
//! temperature in `ln(R)`.

use log::{debug, info, warn};

use crate::analog::{AdcPeripheral, Channel, RESOLUTION, SharedAnalog};

/// Readings below this are an open input: no thermistor connected.
pub const PRESENCE_THRESHOLD: u16 = 10;

const SERIES_RESISTOR_OHMS: f64 = 10_000.0;

// 1/T = K0 + K1·ln(R) + K3·ln(R)³ + K5·ln(R)⁵
const K0: f64 = 0.001_475_304_134_099_33;
const K1: f64 = 0.000_236_552_076_866_679;
const K3: f64 = 0.000_000_118_857_119_853_526;
const K5: f64 = -0.000_000_000_074_635_312_369_958;

const KELVIN_OFFSET: f64 = 273.15;

/// Thermistor resistance for a raw reading, `None` when out of range.
pub fn resistance_from_raw(raw: u16) -> Option<f64> {
    if raw < PRESENCE_THRESHOLD {
        return None;
    }
    let resistance = SERIES_RESISTOR_OHMS * (f64::from(RESOLUTION) / f64::from(raw) - 1.0);
    (resistance > 0.0).then_some(resistance)
}

/// Temperature in Celsius for a raw divider reading.
pub fn celsius_from_raw(raw: u16) -> Option<f32> {
    let l = libm::log(resistance_from_raw(raw)?);
    let l2 = l * l;
    let inverse_kelvin = K0 + l * (K1 + l2 * (K3 + l2 * K5));
    if inverse_kelvin <= 0.0 {
        return None;
    }
    Some((1.0 / inverse_kelvin - KELVIN_OFFSET) as f32)
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

pub struct GlobeThermistor<'a, A> {
    analog: &'a SharedAnalog<A>,
    channel: Channel,
}

impl<'a, A: AdcPeripheral> GlobeThermistor<'a, A> {
    pub fn new(analog: &'a SharedAnalog<A>, channel: Channel) -> Self {
        Self { analog, channel }
    }

    pub fn init(&mut self) {
        info!("globe thermistor on channel {}", self.channel);
    }

    /// Presence heuristic: an unconnected input reads near zero.
    pub fn probe(&mut self) -> bool {
        self.analog
            .read_blocking(self.channel)
            .is_some_and(|raw| raw >= PRESENCE_THRESHOLD)
    }

    /// Raw divider reading, `None` if nothing is connected.
    pub fn read_raw(&mut self) -> Option<u16> {
        let raw = self.analog.read_blocking(self.channel)?;
        if raw < PRESENCE_THRESHOLD {
            warn!("globe thermistor: reading {} below threshold, not connected?", raw);
            return None;
        }
        Some(raw)
    }

    pub fn read_celsius(&mut self) -> Option<f32> {
        let raw = self.read_raw()?;
        let celsius = celsius_from_raw(raw);
        debug!("globe thermistor: raw {} -> {:?} C", raw, celsius);
        celsius
    }

    /// Radiant temperature in Fahrenheit.
    pub fn read(&mut self) -> Option<f32> {
        self.read_celsius().map(celsius_to_fahrenheit)
    }
}
