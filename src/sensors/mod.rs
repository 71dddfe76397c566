//! Drivers for the sensors on the pod

pub mod co;
pub mod cozir;
pub mod hih8120;
pub mod opt3001;
pub mod sound;
pub mod sps30;
pub mod thermistor;

pub use co::CoSensor;
pub use cozir::{CozIr, SoftSerial};
pub use hih8120::{ClimateReading, Hih8120};
pub use opt3001::Opt3001;
pub use sound::{SampleTimer, SoundAccumulator, SoundLevel, SoundState, SoundStats};
pub use sps30::{ParticulateReading, PowerState, Readout, Sps30};
pub use thermistor::GlobeThermistor;

/// Result of a sensor availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Available,
    Unavailable,
    /// The sensor cannot be checked, or cannot be checked right now.
    Unknown,
}

impl From<bool> for Presence {
    fn from(available: bool) -> Self {
        if available {
            Self::Available
        } else {
            Self::Unavailable
        }
    }
}

/// Quantities measured by the pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Light,
    Sound,
    Humidity,
    Temperature,
    RadiantTemperature,
    Co2,
    Co,
    Pm2_5,
    Pm10,
}

/// Range of values a sensor can report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingRange {
    pub min: f32,
    pub max: f32,
    pub unit: &'static str,
}

impl OperatingRange {
    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl SensorKind {
    pub const ALL: [SensorKind; 9] = [
        Self::Light,
        Self::Sound,
        Self::Humidity,
        Self::Temperature,
        Self::RadiantTemperature,
        Self::Co2,
        Self::Co,
        Self::Pm2_5,
        Self::Pm10,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Sound => "sound",
            Self::Humidity => "humidity",
            Self::Temperature => "temperature",
            Self::RadiantTemperature => "radiant temperature",
            Self::Co2 => "CO2",
            Self::Co => "CO",
            Self::Pm2_5 => "PM2.5",
            Self::Pm10 => "PM10",
        }
    }

    /// Limits of the physical device, in the units the drivers report.
    pub const fn operating_range(self) -> OperatingRange {
        let (min, max, unit) = match self {
            Self::Light => (0.0, 80_000.0, "lux"),
            // Standard deviation of raw counts, not calibrated.
            Self::Sound => (200.0, 1500.0, ""),
            Self::Humidity => (0.0, 100.0, "%"),
            Self::Temperature => (-40.0, 125.0, "C"),
            Self::RadiantTemperature => (-67.0, 176.0, "F"),
            Self::Co2 => (0.0, 2000.0, "ppm"),
            Self::Co => (0.0, 1000.0, ""),
            Self::Pm2_5 | Self::Pm10 => (-1.0, 10_000.0, "ug/m3"),
        };
        OperatingRange { min, max, unit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operating_ranges() {
        assert!(SensorKind::Temperature.operating_range().contains(-40.0));
        assert!(!SensorKind::Temperature.operating_range().contains(125.5));
        assert!(SensorKind::RadiantTemperature.operating_range().contains(77.0));
        assert!(!SensorKind::Co2.operating_range().contains(2500.0));
        for kind in SensorKind::ALL {
            let range = kind.operating_range();
            assert!(range.min < range.max, "{}", kind.name());
        }
    }

    #[test]
    fn test_presence_from_probe() {
        assert_eq!(Presence::from(true), Presence::Available);
        assert_eq!(Presence::from(false), Presence::Unavailable);
    }
}
