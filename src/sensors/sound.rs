//! Background microphone sampling
//!
//! A periodic timer interrupt pulls the newest free-running conversion of the
//! microphone channel into a [`SoundAccumulator`]. The main line takes
//! [`SoundStats`] snapshots that reset the accumulator in the same critical
//! section, so every sample lands in exactly one snapshot.
//!
//! The reported sound level is the standard deviation of the raw samples. It
//! is robust against single spikes but has no absolute dB calibration.

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use log::{debug, info};

use crate::analog::{AdcPeripheral, Channel, SharedAnalog};
use crate::config::SoundConfig;
use crate::time::Clock;

/// Running statistics over raw analog samples.
///
/// `sum_of_squares` is 64 bits wide so `u32::MAX` samples of full scale
/// cannot overflow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundAccumulator {
    start_ms: u64,
    count: u32,
    sum: u64,
    sum_of_squares: u64,
    min: u16,
    max: u16,
}

impl Default for SoundAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundAccumulator {
    pub const fn new() -> Self {
        Self {
            start_ms: 0,
            count: 0,
            sum: 0,
            sum_of_squares: 0,
            min: u16::MAX,
            max: 0,
        }
    }

    pub fn reset(&mut self, now_ms: u64) {
        *self = Self {
            start_ms: now_ms,
            ..Self::new()
        };
    }

    /// Integer only, constant time. Safe to call from the timer interrupt.
    #[inline]
    pub fn add_sample(&mut self, raw: u16) {
        let value = u64::from(raw);
        self.count = self.count.saturating_add(1);
        self.sum += value;
        self.sum_of_squares += value * value;
        self.min = self.min.min(raw);
        self.max = self.max.max(raw);
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Statistics of the samples collected so far, `None` if there are none.
    pub fn stats(&self, now_ms: u64) -> Option<SoundStats> {
        if self.count == 0 {
            return None;
        }
        let n = f64::from(self.count);
        let mean = self.sum as f64 / n;
        let mean_square = self.sum_of_squares as f64 / n;
        // Rounding can push the variance slightly negative for constant input.
        let variance = mean_square - mean * mean;
        let std_dev = if variance > 0.0 {
            libm::sqrt(variance)
        } else {
            0.0
        };

        Some(SoundStats {
            count: self.count,
            mean: mean as f32,
            rms: libm::sqrt(mean_square) as f32,
            std_dev: std_dev as f32,
            min: self.min,
            max: self.max,
            elapsed_ms: now_ms.saturating_sub(self.start_ms),
        })
    }
}

/// One snapshot of the sound accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoundStats {
    pub count: u32,
    pub mean: f32,
    pub rms: f32,
    pub std_dev: f32,
    pub min: u16,
    pub max: u16,
    /// Length of the window the samples were collected over.
    pub elapsed_ms: u64,
}

impl SoundStats {
    pub fn peak_to_peak(&self) -> u16 {
        self.max.saturating_sub(self.min)
    }
}

/// State shared between [`SoundLevel`] and the timer interrupt.
///
/// Meant to live in a `static` next to the [`SharedAnalog`] it reads from;
/// the interrupt handler calls [`SoundState::on_timer_tick`].
pub struct SoundState {
    sampling: Mutex<Cell<bool>>,
    accumulator: Mutex<RefCell<SoundAccumulator>>,
}

impl Default for SoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundState {
    pub const fn new() -> Self {
        Self {
            sampling: Mutex::new(Cell::new(false)),
            accumulator: Mutex::new(RefCell::new(SoundAccumulator::new())),
        }
    }

    /// Timer interrupt body. Adds the newest free-running result, if any.
    pub fn on_timer_tick<A: AdcPeripheral>(&self, analog: &SharedAnalog<A>) {
        critical_section::with(|cs| {
            if !self.sampling.borrow(cs).get() {
                return;
            }
            if let Some(raw) = analog.latest(cs) {
                self.accumulator.borrow_ref_mut(cs).add_sample(raw);
            }
        });
    }

    pub fn is_sampling(&self) -> bool {
        critical_section::with(|cs| self.sampling.borrow(cs).get())
    }
}

/// Periodic timer interrupt source driving [`SoundState::on_timer_tick`].
pub trait SampleTimer {
    /// Arm the timer to fire every `period_us` microseconds.
    fn start(&mut self, period_us: u32);

    /// Disarm the timer. No tick may fire after this returns.
    fn stop(&mut self);
}

/// Sound level sensor: microphone on a free-running analog channel.
pub struct SoundLevel<'a, A, T, C> {
    analog: &'a SharedAnalog<A>,
    state: &'a SoundState,
    timer: T,
    clock: C,
    channel: Channel,
    period_us: u32,
}

impl<'a, A, T, C> SoundLevel<'a, A, T, C>
where
    A: AdcPeripheral,
    T: SampleTimer,
    C: Clock,
{
    pub fn new(
        analog: &'a SharedAnalog<A>,
        state: &'a SoundState,
        timer: T,
        clock: C,
        config: SoundConfig,
    ) -> Self {
        Self {
            analog,
            state,
            timer,
            clock,
            channel: config.channel,
            period_us: config.sample_interval_us,
        }
    }

    /// Leave sampling stopped with an empty accumulator.
    pub fn init(&mut self) {
        self.stop();
        self.reset();
    }

    /// Begin background sampling. No-op if already sampling.
    pub fn start(&mut self) {
        if self.state.is_sampling() {
            return;
        }
        let now = self.clock.now_ms();
        self.analog.start_free_running(self.channel);
        critical_section::with(|cs| {
            self.state.accumulator.borrow_ref_mut(cs).reset(now);
            self.state.sampling.borrow(cs).set(true);
        });
        self.timer.start(self.period_us);
        info!(
            "sound: sampling channel {} every {} us",
            self.channel, self.period_us
        );
    }

    /// End background sampling. No-op if not sampling.
    pub fn stop(&mut self) {
        if !self.state.is_sampling() {
            return;
        }
        self.timer.stop();
        critical_section::with(|cs| self.state.sampling.borrow(cs).set(false));
        self.analog.stop_free_running();
        info!("sound: sampling stopped");
    }

    pub fn is_sampling(&self) -> bool {
        self.state.is_sampling()
    }

    /// Drop everything collected so far and restart the window.
    pub fn reset(&mut self) {
        let now = self.clock.now_ms();
        critical_section::with(|cs| self.state.accumulator.borrow_ref_mut(cs).reset(now));
    }

    /// Copy and reset the accumulator in one step.
    ///
    /// `None` when not sampling or nothing was collected since the last
    /// snapshot.
    pub fn snapshot(&mut self) -> Option<SoundStats> {
        let now = self.clock.now_ms();
        let taken = critical_section::with(|cs| {
            if !self.state.sampling.borrow(cs).get() {
                return None;
            }
            let mut accumulator = self.state.accumulator.borrow_ref_mut(cs);
            let taken = *accumulator;
            accumulator.reset(now);
            Some(taken)
        })?;

        let stats = taken.stats(now);
        if let Some(stats) = &stats {
            debug!(
                "sound: {} samples over {} ms, sd {}",
                stats.count, stats.elapsed_ms, stats.std_dev
            );
        }
        stats
    }

    /// Current sound level: standard deviation of the raw samples.
    pub fn read(&mut self) -> Option<f32> {
        self.snapshot().map(|stats| stats.std_dev)
    }
}
