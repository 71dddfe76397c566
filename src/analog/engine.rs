use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};

use super::{AdcMode, AdcPeripheral, Channel};

/// What the sampling engine is currently doing with the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    OnDemand,
    FreeRunning(Channel),
}

/// Sampling engine owning the ADC peripheral.
///
/// This type assumes exclusive access; share it with interrupt context
/// through [`SharedAnalog`].
pub struct AnalogSampler<A> {
    adc: A,
    mode: SamplingMode,
}

impl<A: AdcPeripheral> AnalogSampler<A> {
    pub const fn new(adc: A) -> Self {
        Self {
            adc,
            mode: SamplingMode::OnDemand,
        }
    }

    pub fn init(&mut self) {
        self.adc.enable();
        self.adc.set_mode(AdcMode::SingleShot);
        self.mode = SamplingMode::OnDemand;
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn is_free_running(&self) -> bool {
        matches!(self.mode, SamplingMode::FreeRunning(_))
    }

    /// Switch to continuous conversion of `channel`. No-op if already
    /// free-running.
    pub fn start_free_running(&mut self, channel: Channel) {
        if self.is_free_running() {
            return;
        }
        self.adc.set_mode(AdcMode::FreeRunning(channel));
        self.mode = SamplingMode::FreeRunning(channel);
    }

    /// Back to single-shot conversions. The converter stays enabled.
    pub fn stop_free_running(&mut self) {
        if !self.is_free_running() {
            return;
        }
        self.adc.set_mode(AdcMode::SingleShot);
        self.mode = SamplingMode::OnDemand;
    }

    /// Stop free-running, returning the channel to resume on, if any.
    fn pause(&mut self) -> Option<Channel> {
        let resume = match self.mode {
            SamplingMode::FreeRunning(channel) => Some(channel),
            SamplingMode::OnDemand => None,
        };
        self.stop_free_running();
        resume
    }

    /// Blocking single conversion. The sampler must be in on-demand mode.
    fn convert(&mut self, channel: Channel) -> u16 {
        // Let a conversion left over from free-running finish first.
        while self.adc.is_busy() {
            core::hint::spin_loop();
        }
        // An unread free-running result would satisfy the completion wait.
        if self.adc.conversion_complete() {
            let _ = self.adc.read_result();
        }
        self.adc.start_conversion(channel);
        while !self.adc.conversion_complete() {
            core::hint::spin_loop();
        }
        self.adc.read_result()
    }

    /// Single conversion of `channel`, pausing and resuming free-running
    /// mode around it.
    pub fn read_blocking(&mut self, channel: Channel) -> u16 {
        let resume = self.pause();
        let value = self.convert(channel);
        if let Some(free_running) = resume {
            self.start_free_running(free_running);
        }
        value
    }

    /// Newest free-running result, if one arrived since the last call.
    ///
    /// If the peripheral no longer matches free-running mode (someone else
    /// reprogrammed it) the mode is forced back and this call yields `None`.
    pub fn read_latest_nonblocking(&mut self) -> Option<u16> {
        let SamplingMode::FreeRunning(channel) = self.mode else {
            return None;
        };
        if self.adc.mode() != AdcMode::FreeRunning(channel) {
            self.adc.set_mode(AdcMode::FreeRunning(channel));
            return None;
        }
        if !self.adc.conversion_complete() {
            return None;
        }
        Some(self.adc.read_result())
    }
}

/// [`AnalogSampler`] shared between the main line and one interrupt handler.
///
/// Lives in a `static`:
///
/// ```rust,ignore
/// static ANALOG: SharedAnalog<BoardAdc> = SharedAnalog::new();
///
/// ANALOG.install(BoardAdc::take());
/// ```
///
/// Every main-line access runs inside a critical section. The blocking read
/// takes the sampler out of the cell for the duration of the conversion, so
/// interrupts stay enabled while it waits and an interrupt arriving in the
/// meantime simply finds no sampler and yields `None`.
pub struct SharedAnalog<A> {
    sampler: Mutex<RefCell<Option<AnalogSampler<A>>>>,
}

impl<A> Default for SharedAnalog<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> SharedAnalog<A> {
    pub const fn new() -> Self {
        Self {
            sampler: Mutex::new(RefCell::new(None)),
        }
    }
}

impl<A: AdcPeripheral> SharedAnalog<A> {
    /// Hand the peripheral over and initialize it in on-demand mode.
    pub fn install(&self, adc: A) {
        let mut sampler = AnalogSampler::new(adc);
        sampler.init();
        critical_section::with(|cs| {
            self.sampler.borrow_ref_mut(cs).replace(sampler);
        });
    }

    pub fn is_installed(&self) -> bool {
        critical_section::with(|cs| self.sampler.borrow_ref(cs).is_some())
    }

    /// Re-run peripheral initialization. Leaves free-running mode.
    pub fn init(&self) {
        critical_section::with(|cs| {
            if let Some(sampler) = self.sampler.borrow_ref_mut(cs).as_mut() {
                sampler.init();
            }
        });
    }

    pub fn start_free_running(&self, channel: Channel) {
        critical_section::with(|cs| {
            if let Some(sampler) = self.sampler.borrow_ref_mut(cs).as_mut() {
                sampler.start_free_running(channel);
            }
        });
    }

    pub fn stop_free_running(&self) {
        critical_section::with(|cs| {
            if let Some(sampler) = self.sampler.borrow_ref_mut(cs).as_mut() {
                sampler.stop_free_running();
            }
        });
    }

    pub fn is_free_running(&self) -> bool {
        critical_section::with(|cs| {
            self.sampler
                .borrow_ref(cs)
                .as_ref()
                .is_some_and(AnalogSampler::is_free_running)
        })
    }

    pub fn mode(&self) -> Option<SamplingMode> {
        critical_section::with(|cs| self.sampler.borrow_ref(cs).as_ref().map(AnalogSampler::mode))
    }

    /// Blocking conversion of `channel`, preserving free-running mode.
    ///
    /// `None` only when no peripheral has been installed.
    pub fn read_blocking(&self, channel: Channel) -> Option<u16> {
        let (mut sampler, resume) = critical_section::with(|cs| {
            let mut sampler = self.sampler.borrow_ref_mut(cs).take()?;
            let resume = sampler.pause();
            Some((sampler, resume))
        })?;

        let value = sampler.convert(channel);

        critical_section::with(|cs| {
            if let Some(free_running) = resume {
                sampler.start_free_running(free_running);
            }
            self.sampler.borrow_ref_mut(cs).replace(sampler);
        });
        Some(value)
    }

    /// Newest free-running result. For the sampling interrupt only; a
    /// second interrupt source calling this is not supported.
    pub fn read_latest_nonblocking(&self) -> Option<u16> {
        critical_section::with(|cs| self.latest(cs))
    }

    /// [`Self::read_latest_nonblocking`] for callers already holding a
    /// critical section.
    pub fn latest(&self, cs: CriticalSection<'_>) -> Option<u16> {
        self.sampler
            .borrow_ref_mut(cs)
            .as_mut()
            .and_then(AnalogSampler::read_latest_nonblocking)
    }
}
