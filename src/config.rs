use serde::{Deserialize, Serialize};

use crate::sensors::sps30::Readout;

/// Tunables for every sensor on the pod.
///
/// The defaults match the PODD v2 board.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SensorConfig {
    pub light: LightConfig,
    pub sound: SoundConfig,
    pub climate: ClimateConfig,
    pub radiant: RadiantConfig,
    pub co2: Co2Config,
    pub co: CoConfig,
    pub particulate: ParticulateConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            light: LightConfig { address: 0x45 },
            sound: SoundConfig {
                channel: 0,
                sample_interval_us: 10_000,
            },
            climate: ClimateConfig { address: 0x27 },
            radiant: RadiantConfig { channel: 1 },
            co2: Co2Config {
                baud_rate: 9600,
                filter_depth: 32,
            },
            co: CoConfig { channel: 3 },
            particulate: ParticulateConfig {
                settle_ms: 100,
                warmup_ms: 8000,
                clean_wait_ms: 12_000,
                readout: Readout::Full,
            },
        }
    }
}

/// OPT3001 ambient light sensor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightConfig {
    /// 0x44..=0x47 depending on the ADDR pin strap.
    pub address: u8,
}

/// Microphone sampled in the background.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundConfig {
    /// Analog channel held in free-running conversion.
    pub channel: u8,
    /// Timer interrupt period. Every tick costs interrupt time, so keep it
    /// no faster than needed.
    pub sample_interval_us: u32,
}

/// HIH8120 temperature/humidity sensor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimateConfig {
    pub address: u8,
}

/// Globe thermistor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadiantConfig {
    pub channel: u8,
}

/// CozIR CO2 sensor on the software serial port.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Co2Config {
    pub baud_rate: u32,
    /// Samples in the sensor's moving average. The sensor measures at 2 Hz.
    pub filter_depth: u16,
}

/// Electrochemical CO cell.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoConfig {
    pub channel: u8,
}

/// SPS30 particulate matter sensor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticulateConfig {
    /// Wait after toggling the enable line.
    pub settle_ms: u32,
    /// Wait after starting measurement when the caller asks to block.
    /// First data shows up after 5-8 s; values settle after 80-120 s.
    pub warmup_ms: u32,
    /// Wait after a fan clean when the caller asks to block. The clean
    /// itself runs for 10 s.
    pub clean_wait_ms: u32,
    pub readout: Readout,
}
