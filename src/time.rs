//! Monotonic time source consumed by the drivers

/// Monotonic millisecond clock.
///
/// Only differences between two readings are meaningful.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// [`Clock`] backed by the embassy time driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        embassy_time::Instant::now().as_millis()
    }
}

/// Milliseconds elapsed since `since`, tolerant of a clock that reads earlier.
pub fn elapsed_ms<C: Clock>(clock: &C, since: u64) -> u64 {
    clock.now_ms().saturating_sub(since)
}
