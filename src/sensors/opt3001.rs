use embedded_hal::i2c::I2c;
use log::{debug, error, info};

use crate::error::SensorError;

const SENSOR: &str = "OPT3001";

const REG_RESULT: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Automatic full-scale range, 800 ms conversion time, continuous
/// conversions, latched interrupt reporting.
const CONFIG_CONTINUOUS_AUTO_RANGE: u16 = 0xCE10;

/// Largest exponent the device reports; anything above is an error code.
const MAX_EXPONENT: u8 = 0x0B;

/// Convert the raw result register to lux.
///
/// The top four bits are a binary exponent, the low twelve bits a mantissa
/// with an LSB of 0.01 lux at exponent zero.
pub fn lux_from_raw(raw: u16) -> Result<f32, SensorError> {
    let exponent = (raw >> 12) as u8;
    if exponent > MAX_EXPONENT {
        return Err(SensorError::Protocol {
            sensor: SENSOR,
            operation: "decode result",
            details: "exponent out of range",
        });
    }
    let mantissa = f32::from(raw & 0x0FFF);
    Ok(0.01 * f32::from(1u16 << exponent) * mantissa)
}

/// TI OPT3001 ambient light sensor.
///
/// Runs in continuous auto-ranging mode. After a large step in illumination
/// the range search can take a few seconds, so individual readings may lag.
pub struct Opt3001<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Opt3001<I> {
    pub fn new(i2c: I, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn init(&mut self) -> Result<(), SensorError> {
        let [hi, lo] = CONFIG_CONTINUOUS_AUTO_RANGE.to_be_bytes();
        self.i2c
            .write(self.address, &[REG_CONFIG, hi, lo])
            .map_err(|e| {
                error!("OPT3001 configuration write failed: {:?}", e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation: "write configuration",
                }
            })?;
        info!("OPT3001: continuous auto-range at {:#04x}", self.address);
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<u16, SensorError> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.address, &[register], &mut buf)
            .map_err(|e| {
                debug!("OPT3001 register {:#04x} read failed: {:?}", register, e);
                SensorError::Bus {
                    sensor: SENSOR,
                    operation: "read register",
                }
            })?;
        Ok(u16::from_be_bytes(buf))
    }

    fn measure(&mut self) -> Result<f32, SensorError> {
        let raw = self.read_register(REG_RESULT)?;
        lux_from_raw(raw)
    }

    /// A reading completes without a bus or device error.
    pub fn probe(&mut self) -> bool {
        self.measure().is_ok()
    }

    /// Illuminance in lux.
    pub fn read(&mut self) -> Option<f32> {
        match self.measure() {
            Ok(lux) => {
                debug!("OPT3001: {} lux", lux);
                Some(lux)
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{I2cEvent, ScriptedI2c};

    const ADDR: u8 = 0x45;

    #[test]
    fn test_lux_scaling() {
        assert_eq!(lux_from_raw(0x0000).unwrap(), 0.0);
        assert!((lux_from_raw(0x0064).unwrap() - 1.0).abs() < 1e-6);
        // Exponent 3, mantissa 0x3E8 = 1000: 0.08 lux/LSB.
        assert!((lux_from_raw(0x33E8).unwrap() - 80.0).abs() < 1e-3);
        // Top of the range.
        assert!((lux_from_raw(0xBFFF).unwrap() - 83_865.6).abs() < 0.1);
    }

    #[test]
    fn test_error_exponent_rejected() {
        assert!(matches!(
            lux_from_raw(0xC123),
            Err(SensorError::Protocol { .. })
        ));
    }

    #[test]
    fn test_init_writes_configuration() {
        let bus = ScriptedI2c::new();
        let mut light = Opt3001::new(bus.clone(), ADDR);
        light.init().unwrap();
        assert_eq!(bus.writes_to(ADDR), vec![vec![REG_CONFIG, 0xCE, 0x10]]);
    }

    #[test]
    fn test_read_selects_result_register() {
        let bus = ScriptedI2c::new();
        bus.queue_read(ADDR, &[0x10, 0x64]);
        let mut light = Opt3001::new(bus.clone(), ADDR);

        assert!((light.read().unwrap() - 2.0).abs() < 1e-6);
        assert_eq!(
            bus.log(),
            vec![
                I2cEvent::Write(ADDR, vec![REG_RESULT]),
                I2cEvent::Read(ADDR, 2)
            ]
        );
    }

    #[test]
    fn test_absent_device_reads_none() {
        let bus = ScriptedI2c::new();
        bus.set_absent(ADDR);
        let mut light = Opt3001::new(bus.clone(), ADDR);
        assert!(light.init().is_err());
        assert!(!light.probe());
        assert!(light.read().is_none());

        bus.set_present(ADDR);
        bus.queue_read(ADDR, &[0x00, 0x64]);
        assert!(light.read().is_some());
    }

    #[test]
    fn test_probe_rejects_error_code() {
        let bus = ScriptedI2c::new();
        bus.queue_read(ADDR, &[0xF0, 0x00]);
        let mut light = Opt3001::new(bus, ADDR);
        assert!(!light.probe());
    }
}
