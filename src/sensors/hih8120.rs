use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{debug, error};

use crate::error::SensorError;
use crate::time::{Clock, elapsed_ms};

const SENSOR: &str = "HIH8120";

/// Wait between the measurement request and the first poll.
const FIRST_POLL_DELAY_MS: u32 = 35;
const POLL_INTERVAL_MS: u32 = 10;
const CONVERSION_TIMEOUT_MS: u64 = 100;

/// Full scale of the 14-bit humidity and temperature fields.
const FULL_SCALE: f32 = 16382.0;

/// Most recent temperature/humidity reading. `None` marks an invalid value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub celsius: Option<f32>,
    pub relative_humidity: Option<f32>,
}

impl ClimateReading {
    pub const INVALID: Self = Self {
        celsius: None,
        relative_humidity: None,
    };

    pub fn fahrenheit(&self) -> Option<f32> {
        self.celsius.map(|c| c * 1.8 + 32.0)
    }
}

/// Decode a 4-byte measurement frame.
///
/// The two top bits of the first byte are the status. Anything other than
/// `00` means the frame is stale or the device is in command mode.
pub fn decode_frame(frame: &[u8; 4]) -> Result<ClimateReading, SensorError> {
    if frame[0] >> 6 != 0 {
        return Err(SensorError::Protocol {
            sensor: SENSOR,
            operation: "decode frame",
            details: "status bits not ready",
        });
    }
    let humidity = (u16::from(frame[0] & 0x3F) << 8) | u16::from(frame[1]);
    let temperature = (u16::from(frame[2]) << 6) | u16::from(frame[3] >> 2);

    Ok(ClimateReading {
        celsius: Some(f32::from(temperature) * 165.0 / FULL_SCALE - 40.0),
        relative_humidity: Some(f32::from(humidity) * 100.0 / FULL_SCALE),
    })
}

/// Honeywell HIH8120 temperature and relative humidity sensor.
///
/// Conversions are triggered by an empty write and then polled until the
/// status bits report fresh data.
pub struct Hih8120<I, D, C> {
    i2c: I,
    delay: D,
    clock: C,
    address: u8,
    reading: ClimateReading,
}

impl<I, D, C> Hih8120<I, D, C>
where
    I: I2c,
    D: DelayNs,
    C: Clock,
{
    pub fn new(i2c: I, delay: D, clock: C, address: u8) -> Self {
        Self {
            i2c,
            delay,
            clock,
            address,
            reading: ClimateReading::INVALID,
        }
    }

    /// Nothing to configure; clears any previous reading.
    pub fn init(&mut self) {
        self.reading = ClimateReading::INVALID;
    }

    /// Two-byte read that does not start a conversion.
    pub fn probe(&mut self) -> bool {
        let mut buf = [0u8; 2];
        self.i2c.read(self.address, &mut buf).is_ok()
    }

    fn measure(&mut self) -> Result<ClimateReading, SensorError> {
        let started = self.clock.now_ms();
        self.i2c.write(self.address, &[]).map_err(|e| {
            debug!("HIH8120 measurement request failed: {:?}", e);
            SensorError::Bus {
                sensor: SENSOR,
                operation: "request measurement",
            }
        })?;
        self.delay.delay_ms(FIRST_POLL_DELAY_MS);

        let mut frame = [0u8; 4];
        loop {
            self.i2c.read(self.address, &mut frame).map_err(|e| {
                debug!("HIH8120 frame read failed: {:?}", e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation: "read frame",
                }
            })?;
            if frame[0] >> 6 == 0 {
                return decode_frame(&frame);
            }
            if elapsed_ms(&self.clock, started) > CONVERSION_TIMEOUT_MS {
                return Err(SensorError::Timeout {
                    sensor: SENSOR,
                    operation: "wait for conversion",
                });
            }
            self.delay.delay_ms(POLL_INTERVAL_MS);
        }
    }

    /// Run one conversion and store the result.
    ///
    /// The stored reading is cleared first, so a failure never leaves a stale
    /// value behind.
    pub fn retrieve(&mut self) -> bool {
        self.reading = ClimateReading::INVALID;
        match self.measure() {
            Ok(reading) => {
                debug!(
                    "HIH8120: {:?} C, {:?} %RH",
                    reading.celsius, reading.relative_humidity
                );
                self.reading = reading;
                true
            }
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    /// Retrieve and return the new reading.
    pub fn read(&mut self) -> ClimateReading {
        self.retrieve();
        self.reading
    }

    pub fn reading(&self) -> ClimateReading {
        self.reading
    }

    pub fn celsius(&self) -> Option<f32> {
        self.reading.celsius
    }

    pub fn fahrenheit(&self) -> Option<f32> {
        self.reading.fahrenheit()
    }

    pub fn relative_humidity(&self) -> Option<f32> {
        self.reading.relative_humidity
    }
}
