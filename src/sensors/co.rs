use log::{debug, warn};

use crate::analog::{AdcPeripheral, Channel, SharedAnalog};

/// Electrochemical CO cell read straight off an analog channel.
///
/// The value is raw converter counts and carries no calibration. Low
/// readings are legitimate, so there is no presence check.
pub struct CoSensor<'a, A> {
    analog: &'a SharedAnalog<A>,
    channel: Channel,
}

impl<'a, A: AdcPeripheral> CoSensor<'a, A> {
    pub fn new(analog: &'a SharedAnalog<A>, channel: Channel) -> Self {
        Self { analog, channel }
    }

    pub fn init(&mut self) {
        warn!("CO sensor on channel {} reports uncalibrated counts", self.channel);
    }

    /// Always true: an absent cell cannot be told apart from clean air.
    pub fn probe(&mut self) -> bool {
        true
    }

    pub fn read(&mut self) -> Option<u16> {
        let raw = self.analog.read_blocking(self.channel);
        debug!("CO: raw {:?}", raw);
        raw
    }
}
