//! Sensor management and state

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal_bus::i2c::RefCellDevice;
use heapless::Vec;
use log::{error, info};

use super::hardware::{SensorHardware, share_i2c_bus};
use crate::analog::{AdcPeripheral, SharedAnalog};
use crate::config::SensorConfig;
use crate::sensors::{
    CoSensor, CozIr, GlobeThermistor, Hih8120, Opt3001, Presence, SampleTimer, SensorKind,
    SoftSerial, SoundLevel, Sps30,
};
use crate::time::Clock;

/// Wait after bringing up every sensor.
const POST_INIT_SETTLE_MS: u32 = 100;

/// Availability of every sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Availability {
    pub light: Presence,
    pub sound: Presence,
    pub climate: Presence,
    pub radiant: Presence,
    pub co2: Presence,
    pub co: Presence,
    pub particulate: Presence,
}

/// One reading of every quantity. `None` marks an invalid or unavailable
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentSample {
    /// Illuminance [lux]
    pub light: Option<f32>,
    /// Sound level, uncalibrated
    pub sound: Option<f32>,
    /// Relative humidity [%]
    pub humidity: Option<f32>,
    /// Air temperature [°C]
    pub temperature: Option<f32>,
    /// Globe temperature [°F]
    pub radiant_temperature: Option<f32>,
    /// CO2 [ppm]
    pub co2: Option<u32>,
    /// CO, raw counts
    pub co: Option<u16>,
    /// PM2.5 mass concentration [μg/m³]
    pub pm2_5: Option<f32>,
    /// PM10 mass concentration [μg/m³]
    pub pm10: Option<f32>,
}

impl EnvironmentSample {
    pub fn value(&self, kind: SensorKind) -> Option<f32> {
        match kind {
            SensorKind::Light => self.light,
            SensorKind::Sound => self.sound,
            SensorKind::Humidity => self.humidity,
            SensorKind::Temperature => self.temperature,
            SensorKind::RadiantTemperature => self.radiant_temperature,
            SensorKind::Co2 => self.co2.map(|ppm| ppm as f32),
            SensorKind::Co => self.co.map(f32::from),
            SensorKind::Pm2_5 => self.pm2_5,
            SensorKind::Pm10 => self.pm10,
        }
    }

    /// Valid values lying outside the operating range of their sensor.
    pub fn out_of_range(&self) -> Vec<SensorKind, 9> {
        let mut kinds = Vec::new();
        for kind in SensorKind::ALL {
            let Some(value) = self.value(kind) else {
                continue;
            };
            if !kind.operating_range().contains(value) {
                // ALL has exactly as many entries as the vector holds.
                let _ = kinds.push(kind);
            }
        }
        kinds
    }
}

/// Container for all sensor drivers.
///
/// Drivers are public so callers can use the per-sensor operations
/// directly; the methods here cover the whole-pod operations.
pub struct SensorSuite<'a, B, A, T, S, P, D, C> {
    pub light: Opt3001<RefCellDevice<'a, B>>,
    pub sound: SoundLevel<'a, A, T, C>,
    pub climate: Hih8120<RefCellDevice<'a, B>, D, C>,
    pub radiant: GlobeThermistor<'a, A>,
    pub co2: CozIr<S, D>,
    pub co: CoSensor<'a, A>,
    pub particulate: Sps30<RefCellDevice<'a, B>, P, D>,
    analog: &'a SharedAnalog<A>,
    delay: D,
    initialized: bool,
}

impl<'a, B, A, T, S, P, D, C> SensorSuite<'a, B, A, T, S, P, D, C>
where
    B: I2c,
    A: AdcPeripheral,
    T: SampleTimer,
    S: SoftSerial,
    P: OutputPin,
    D: DelayNs + Clone,
    C: Clock + Clone,
{
    pub fn new(hardware: SensorHardware<'a, B, A, T, S, P, D, C>, config: &SensorConfig) -> Self {
        let i2c = share_i2c_bus(hardware.i2c);
        Self {
            light: Opt3001::new(i2c.light, config.light.address),
            sound: SoundLevel::new(
                hardware.analog,
                hardware.sound,
                hardware.sample_timer,
                hardware.clock.clone(),
                config.sound,
            ),
            climate: Hih8120::new(
                i2c.climate,
                hardware.delay.clone(),
                hardware.clock,
                config.climate.address,
            ),
            radiant: GlobeThermistor::new(hardware.analog, config.radiant.channel),
            co2: CozIr::new(hardware.co2_serial, hardware.delay.clone(), config.co2),
            co: CoSensor::new(hardware.analog, config.co.channel),
            particulate: Sps30::new(
                i2c.particulate,
                hardware.particulate_enable,
                hardware.delay.clone(),
                config.particulate,
            ),
            analog: hardware.analog,
            delay: hardware.delay,
            initialized: false,
        }
    }

    /// Bring up every sensor in a fixed order. Runs only once.
    ///
    /// A sensor that fails to initialize is logged and left in place; its
    /// reads will report no value.
    pub fn init(&mut self) {
        if self.initialized {
            return;
        }
        info!("initializing sensors");

        self.analog.init();
        if let Err(e) = self.light.init() {
            error!("light sensor init failed: {}", e);
        }
        self.sound.init();
        self.climate.init();
        self.radiant.init();
        if let Err(e) = self.co2.init() {
            error!("CO2 sensor init failed: {}", e);
        }
        self.co.init();
        self.particulate.init();

        self.delay.delay_ms(POST_INIT_SETTLE_MS);
        self.initialized = true;
        info!("sensors initialized");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Check every sensor.
    ///
    /// Sound and CO cannot be checked. The particulate sensor can only be
    /// checked while it is powered.
    pub fn availability(&mut self) -> Availability {
        let particulate = if self.particulate.is_powered() {
            self.particulate.probe().into()
        } else {
            Presence::Unknown
        };
        Availability {
            light: self.light.probe().into(),
            sound: Presence::Unknown,
            climate: self.climate.probe().into(),
            radiant: self.radiant.probe().into(),
            co2: self.co2.probe().into(),
            co: Presence::Unknown,
            particulate,
        }
    }

    /// Read every sensor once.
    ///
    /// Takes a sound snapshot, which restarts the sound window.
    pub fn sample_all(&mut self) -> EnvironmentSample {
        self.climate.retrieve();
        if self.particulate.is_running() {
            self.particulate.retrieve();
        } else {
            self.particulate.reset_data();
        }

        EnvironmentSample {
            light: self.light.read(),
            sound: self.sound.read(),
            humidity: self.climate.relative_humidity(),
            temperature: self.climate.celsius(),
            radiant_temperature: self.radiant.read(),
            co2: self.co2.read(),
            co: self.co.read(),
            pm2_5: self.particulate.pm2_5(),
            pm10: self.particulate.pm10(),
        }
    }

    /// Power the particulate sensor on if needed and start measuring.
    pub fn start_particulate(&mut self, wait: bool) -> bool {
        self.particulate.power_on();
        self.particulate.start(wait)
    }
}
