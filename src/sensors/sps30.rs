//! Sensirion SPS30 particulate matter sensor
//!
//! The sensor sits behind a load switch. Its lifecycle is
//! `Unpowered -> Idle -> Running`:
//!
//! - [`Sps30::power_on`] drives the enable line high and waits for the
//!   sensor to boot (`Unpowered -> Idle`).
//! - [`Sps30::start`] starts measuring (`Idle -> Running`). The fan and laser
//!   run continuously and a new sample is available every second.
//! - [`Sps30::stop`] returns to `Idle`, [`Sps30::power_off`] to `Unpowered`.
//!
//! Operations attempted in the wrong state are no-ops.

use crc_all::Crc;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ParticulateConfig;
use crate::error::SensorError;

const SENSOR: &str = "SPS30";
const ADDRESS: u8 = 0x69;

const CMD_START_MEASUREMENT: u16 = 0x0010;
const CMD_STOP_MEASUREMENT: u16 = 0x0104;
const CMD_READ_DATA_READY: u16 = 0x0202;
const CMD_READ_MEASURED_VALUES: u16 = 0x0300;
const CMD_START_FAN_CLEANING: u16 = 0x5607;
const CMD_READ_VERSION: u16 = 0xD100;

/// Start argument selecting big-endian IEEE754 float output.
const OUTPUT_FORMAT_FLOAT: u8 = 0x03;

/// Each value is two CRC protected words.
const VALUE_LEN: usize = 6;
const MASS_VALUES: usize = 4;
const ALL_VALUES: usize = 10;

/// How much of the measurement to read out.
///
/// Some I2C controllers cannot read the full 60-byte frame in one transfer.
/// With [`Readout::MassOnly`] only the four mass concentrations are read;
/// number concentrations and typical particle size are then reported as
/// zero, which cannot be told apart from a genuine zero count.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readout {
    Full,
    MassOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Unpowered,
    Idle,
    Running,
}

/// One measurement. `None` marks an unavailable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticulateReading {
    /// Mass concentration PM1.0 [μg/m³]
    pub mass_pm1_0: Option<f32>,
    /// Mass concentration PM2.5 [μg/m³]
    pub mass_pm2_5: Option<f32>,
    /// Mass concentration PM4.0 [μg/m³]
    pub mass_pm4_0: Option<f32>,
    /// Mass concentration PM10 [μg/m³]
    pub mass_pm10: Option<f32>,
    /// Number concentration PM0.5 [#/cm³]
    pub number_pm0_5: Option<f32>,
    /// Number concentration PM1.0 [#/cm³]
    pub number_pm1_0: Option<f32>,
    /// Number concentration PM2.5 [#/cm³]
    pub number_pm2_5: Option<f32>,
    /// Number concentration PM4.0 [#/cm³]
    pub number_pm4_0: Option<f32>,
    /// Number concentration PM10 [#/cm³]
    pub number_pm10: Option<f32>,
    /// Typical particle size [μm]
    pub typical_size: Option<f32>,
}

impl ParticulateReading {
    pub const UNAVAILABLE: Self = Self {
        mass_pm1_0: None,
        mass_pm2_5: None,
        mass_pm4_0: None,
        mass_pm10: None,
        number_pm0_5: None,
        number_pm1_0: None,
        number_pm2_5: None,
        number_pm4_0: None,
        number_pm10: None,
        typical_size: None,
    };

    fn from_values(values: &[f32; ALL_VALUES]) -> Self {
        Self {
            mass_pm1_0: Some(values[0]),
            mass_pm2_5: Some(values[1]),
            mass_pm4_0: Some(values[2]),
            mass_pm10: Some(values[3]),
            number_pm0_5: Some(values[4]),
            number_pm1_0: Some(values[5]),
            number_pm2_5: Some(values[6]),
            number_pm4_0: Some(values[7]),
            number_pm10: Some(values[8]),
            typical_size: Some(values[9]),
        }
    }
}

/// CRC-8 used on every Sensirion data word.
pub(crate) struct SensirionCrc {
    inner: Crc<u8>,
}

impl SensirionCrc {
    pub fn new() -> Self {
        Self {
            inner: Crc::<u8>::new(0x31, 8, 0xff, 0x00, false),
        }
    }

    pub fn calculate(&mut self, input: &[u8]) -> u8 {
        self.inner.init();
        self.inner.update(input);
        self.inner.finish()
    }
}

impl Default for SensirionCrc {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `count` CRC checked floats from the start of `frame`.
fn parse_values(
    frame: &[u8],
    count: usize,
    crc: &mut SensirionCrc,
) -> Result<[f32; ALL_VALUES], SensorError> {
    let mut values = [0.0f32; ALL_VALUES];
    for (value, chunk) in values
        .iter_mut()
        .zip(frame.chunks_exact(VALUE_LEN))
        .take(count)
    {
        if crc.calculate(&chunk[0..2]) != chunk[2] || crc.calculate(&chunk[3..5]) != chunk[5] {
            return Err(SensorError::Protocol {
                sensor: SENSOR,
                operation: "read measured values",
                details: "CRC mismatch",
            });
        }
        *value = f32::from_be_bytes([chunk[0], chunk[1], chunk[3], chunk[4]]);
    }
    Ok(values)
}

pub struct Sps30<I, P, D> {
    i2c: I,
    enable: P,
    delay: D,
    crc: SensirionCrc,
    config: ParticulateConfig,
    state: PowerState,
    reading: ParticulateReading,
}

impl<I, P, D> Sps30<I, P, D>
where
    I: I2c,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(i2c: I, enable: P, delay: D, config: ParticulateConfig) -> Self {
        Self {
            i2c,
            enable,
            delay,
            crc: SensirionCrc::new(),
            config,
            state: PowerState::Unpowered,
            reading: ParticulateReading::UNAVAILABLE,
        }
    }

    /// Hold the sensor unpowered with no data.
    pub fn init(&mut self) {
        self.drive_enable(false);
        self.state = PowerState::Unpowered;
        self.reset_data();
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn is_powered(&self) -> bool {
        self.state != PowerState::Unpowered
    }

    pub fn is_running(&self) -> bool {
        self.state == PowerState::Running
    }

    /// Switch the sensor on. No-op if already powered.
    ///
    /// The sensor counts as powered even if it then fails to answer on the
    /// bus; the failure is logged.
    pub fn power_on(&mut self) {
        if self.is_powered() {
            return;
        }
        self.drive_enable(true);
        info!("SPS30: powered on");
        self.delay.delay_ms(self.config.settle_ms);
        match self.read_version() {
            Ok(version) => info!(
                "SPS30: firmware {}.{}",
                version >> 8,
                version & 0xFF
            ),
            Err(e) => error!("{}", e),
        }
        self.state = PowerState::Idle;
    }

    /// Switch the sensor off, stopping it first if running.
    pub fn power_off(&mut self) {
        if !self.is_powered() {
            return;
        }
        if self.is_running() {
            self.stop();
        }
        self.delay.delay_ms(self.config.settle_ms);
        self.drive_enable(false);
        self.state = PowerState::Unpowered;
        info!("SPS30: powered off");
    }

    /// Start measuring. Only valid when powered.
    ///
    /// With `wait` this blocks until the first sample should be available.
    /// Values keep settling for another one to two minutes. Returns whether
    /// the sensor is running afterwards.
    pub fn start(&mut self, wait: bool) -> bool {
        match self.state {
            PowerState::Running => return true,
            PowerState::Unpowered => {
                warn!(
                    "{}",
                    SensorError::InvalidState {
                        sensor: SENSOR,
                        operation: "start measurement",
                    }
                );
                return false;
            }
            PowerState::Idle => {}
        }

        let crc = self.crc.calculate(&[OUTPUT_FORMAT_FLOAT, 0x00]);
        let [hi, lo] = CMD_START_MEASUREMENT.to_be_bytes();
        if let Err(e) = self.write(&[hi, lo, OUTPUT_FORMAT_FLOAT, 0x00, crc], "start measurement") {
            error!("{}", e);
            return false;
        }
        info!("SPS30: measurement started");
        if wait {
            self.delay.delay_ms(self.config.warmup_ms);
        }
        self.state = PowerState::Running;
        true
    }

    /// Stop measuring. No-op unless running.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.send_command(CMD_STOP_MEASUREMENT, "stop measurement") {
            error!("{}", e);
        }
        self.state = PowerState::Idle;
        info!("SPS30: measurement stopped");
    }

    /// Run the fan at full speed to blow out dust. Only valid while running.
    ///
    /// The device cleans for about ten seconds; with `wait` this blocks until
    /// it is done. Returns whether the sensor accepted the command.
    pub fn clean(&mut self, wait: bool) -> bool {
        if !self.is_running() {
            debug!("SPS30: clean ignored, not running");
            return false;
        }
        if let Err(e) = self.send_command(CMD_START_FAN_CLEANING, "start fan cleaning") {
            error!("{}", e);
            return false;
        }
        info!("SPS30: cleaning");
        if wait {
            self.delay.delay_ms(self.config.clean_wait_ms);
        }
        true
    }

    /// Sensor answers on the bus. Only meaningful while running.
    pub fn probe(&mut self) -> bool {
        self.is_running() && self.read_version().is_ok()
    }

    /// Fetch the newest measurement.
    ///
    /// On any failure, including calling this while not running, every
    /// field becomes unavailable.
    pub fn retrieve(&mut self) -> bool {
        let result = if self.is_running() {
            self.read_measurement()
        } else {
            Err(SensorError::InvalidState {
                sensor: SENSOR,
                operation: "retrieve",
            })
        };
        match result {
            Ok(reading) => {
                debug!(
                    "SPS30: PM2.5 {:?} PM10 {:?}",
                    reading.mass_pm2_5, reading.mass_pm10
                );
                self.reading = reading;
                true
            }
            Err(e) => {
                warn!("{}", e);
                self.reset_data();
                false
            }
        }
    }

    pub fn reset_data(&mut self) {
        self.reading = ParticulateReading::UNAVAILABLE;
    }

    pub fn reading(&self) -> ParticulateReading {
        self.reading
    }

    /// PM2.5 mass concentration from the last retrieval, in μg/m³.
    pub fn pm2_5(&self) -> Option<f32> {
        self.reading.mass_pm2_5
    }

    /// PM10 mass concentration from the last retrieval, in μg/m³.
    pub fn pm10(&self) -> Option<f32> {
        self.reading.mass_pm10
    }

    fn read_measurement(&mut self) -> Result<ParticulateReading, SensorError> {
        let ready = self.read_word(CMD_READ_DATA_READY, "read data ready flag")?;
        if ready != 1 {
            return Err(SensorError::Protocol {
                sensor: SENSOR,
                operation: "read data ready flag",
                details: "no new measurement",
            });
        }

        let count = match self.config.readout {
            Readout::Full => ALL_VALUES,
            Readout::MassOnly => MASS_VALUES,
        };
        let mut frame = [0u8; ALL_VALUES * VALUE_LEN];
        let frame = &mut frame[..count * VALUE_LEN];
        self.i2c
            .write_read(ADDRESS, &CMD_READ_MEASURED_VALUES.to_be_bytes(), frame)
            .map_err(|e| Self::bus(e, "read measured values"))?;

        let values = parse_values(frame, count, &mut self.crc)?;
        Ok(ParticulateReading::from_values(&values))
    }

    fn read_version(&mut self) -> Result<u16, SensorError> {
        self.read_word(CMD_READ_VERSION, "read version")
    }

    fn read_word(&mut self, command: u16, operation: &'static str) -> Result<u16, SensorError> {
        let mut buf = [0u8; 3];
        self.i2c
            .write_read(ADDRESS, &command.to_be_bytes(), &mut buf)
            .map_err(|e| Self::bus(e, operation))?;
        if self.crc.calculate(&buf[..2]) != buf[2] {
            return Err(SensorError::Protocol {
                sensor: SENSOR,
                operation,
                details: "CRC mismatch",
            });
        }
        Ok(u16::from_be_bytes([buf[0], buf[1]]))
    }

    fn send_command(&mut self, command: u16, operation: &'static str) -> Result<(), SensorError> {
        self.write(&command.to_be_bytes(), operation)
    }

    fn write(&mut self, bytes: &[u8], operation: &'static str) -> Result<(), SensorError> {
        self.i2c
            .write(ADDRESS, bytes)
            .map_err(|e| Self::bus(e, operation))
    }

    fn drive_enable(&mut self, high: bool) {
        let result = if high {
            self.enable.set_high()
        } else {
            self.enable.set_low()
        };
        if let Err(e) = result {
            error!("SPS30 enable line: {:?}", e);
        }
    }

    fn bus(e: I::Error, operation: &'static str) -> SensorError {
        debug!("SPS30 {} failed: {:?}", operation, e);
        SensorError::Bus {
            sensor: SENSOR,
            operation,
        }
    }
}
