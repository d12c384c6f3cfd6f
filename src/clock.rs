//! Monotonic time sources and cooldown gates.
//!
//! The drivers and the state machine never read wall-clock time directly.
//! They take a [`Clock`] for "how late is it" questions (reply deadlines,
//! move cooldowns, status timestamps) and an [`embedded_hal::delay::DelayNs`]
//! for "wait this long" questions. Splitting the two keeps every timing
//! decision testable: tests drive a fake clock forward explicitly.

#[cfg(feature = "std")]
use embedded_hal::delay::DelayNs;

/// A monotonic millisecond counter.
///
/// Implementations must be cheap to clone; the servo driver and the tracker
/// core each hold their own handle onto the same underlying time base.
pub trait Clock: Clone {
    /// Milliseconds elapsed since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Seconds elapsed since the same origin, for status timestamps.
    fn now_s(&self) -> f64 {
        self.now_ms() as f64 / 1_000.0
    }
}

/// Rate limiter enforcing a minimum interval between events.
///
/// Used by the auto controller to space corrective servo moves at least
/// one cooldown apart.
#[derive(Debug, Clone, Copy)]
pub struct Cooldown {
    interval_ms: u32,
    last: Option<u64>,
}

impl Cooldown {
    /// Creates a gate that opens `interval_ms` after each [`mark`](Self::mark).
    pub fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    /// Whether the gate is open at time `now_ms`. Always open before the
    /// first [`mark`](Self::mark).
    pub fn ready(&self, now_ms: u64) -> bool {
        match self.last {
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.interval_ms),
            None => true,
        }
    }

    /// Records an event at `now_ms`, closing the gate for one interval.
    pub fn mark(&mut self, now_ms: u64) {
        self.last = Some(now_ms);
    }

    /// Reopens the gate immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Monotonic clock backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Creates a clock whose origin is the moment of the call.
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Blocking [`DelayNs`] backed by [`std::thread::sleep`].
///
/// Sub-microsecond resolution is not guaranteed; for the bit-banged VTX bus
/// this only stretches the bit period, which the receiver tolerates.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct StdDelay;

#[cfg(feature = "std")]
impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(std::time::Duration::from_nanos(u64::from(ns)));
    }
}
