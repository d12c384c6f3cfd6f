//! RSSI calibration and moving-average filtering.
//!
//! Raw ADC counts from the two log-detector outputs are useless for
//! comparison until the per-channel noise floor is subtracted and the
//! inter-channel gain mismatch is compensated. This module holds the
//! calibration state produced by the noise-floor pass and the fixed-length
//! moving-average windows that smooth the calibrated samples before the
//! controller sees them.
//!
//! Values are deliberately allowed to go negative: a reading below the
//! calibrated noise floor is meaningful (the floor drifted since the last
//! calibration) and must not be clipped away.

use heapless::Deque;

use crate::consts::RSSI_FILTER_CAP;

/// Per-channel calibration constants.
///
/// Mutated only when a calibration pass completes; every other part of the
/// tracker treats it as read-only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Calibration {
    /// Mean raw counts on the left channel with no antennas fitted.
    pub noise_floor_left: i32,
    /// Mean raw counts on the right channel with no antennas fitted.
    pub noise_floor_right: i32,
    /// Offset added to the right channel to equalize the two chains.
    pub rssi_offset: i32,
    /// Informational mean of the left channel pointed at a close transmitter.
    pub rssi_max_left: Option<i32>,
    /// Informational mean of the right channel pointed at a close transmitter.
    pub rssi_max_right: Option<i32>,
}

impl Calibration {
    /// Applies the calibration to one raw sample pair.
    ///
    /// `left = raw_l - noise_floor_left`,
    /// `right = raw_r - noise_floor_right + rssi_offset`.
    pub fn apply(&self, raw_left: i32, raw_right: i32) -> (i32, i32) {
        (
            raw_left - self.noise_floor_left,
            raw_right - self.noise_floor_right + self.rssi_offset,
        )
    }
}

/// Fixed-capacity moving-average window.
///
/// The window length is a runtime setting clamped to [`RSSI_FILTER_CAP`];
/// a length of 1 disables averaging. The oldest sample is evicted once the
/// window is full.
#[derive(Debug, Default)]
pub struct MovingAverage {
    window: Deque<i32, RSSI_FILTER_CAP>,
    len: usize,
    last: i32,
}

impl MovingAverage {
    /// Creates a window of `len` samples (clamped to `1..=RSSI_FILTER_CAP`).
    pub fn new(len: usize) -> Self {
        Self {
            window: Deque::new(),
            len: len.clamp(1, RSSI_FILTER_CAP),
            last: 0,
        }
    }

    /// Pushes one sample and returns the mean over the window contents.
    pub fn push(&mut self, sample: i32) -> i32 {
        self.last = sample;
        if self.window.len() >= self.len {
            let _ = self.window.pop_front();
        }
        // Cannot fail: len <= RSSI_FILTER_CAP and we just made room.
        let _ = self.window.push_back(sample);
        self.mean()
    }

    /// Mean over the current contents; an empty window yields the last
    /// sample unfiltered.
    pub fn mean(&self) -> i32 {
        if self.window.is_empty() {
            return self.last;
        }
        let sum: i64 = self.window.iter().map(|&v| i64::from(v)).sum();
        (sum / self.window.len() as i64) as i32
    }

    /// Drops all buffered samples.
    pub fn clear(&mut self) {
        self.window.clear();
    }
}

/// Calibrate-then-filter pipeline for the left/right RSSI pair.
#[derive(Debug)]
pub struct RssiPipeline {
    calibration: Calibration,
    left: MovingAverage,
    right: MovingAverage,
    last_filtered: (i32, i32),
}

impl RssiPipeline {
    /// Creates a pipeline with the given filter window length.
    pub fn new(filter_len: usize) -> Self {
        Self {
            calibration: Calibration::default(),
            left: MovingAverage::new(filter_len),
            right: MovingAverage::new(filter_len),
            last_filtered: (0, 0),
        }
    }

    /// Calibrates one raw sample pair, pushes it through the filter windows
    /// and returns the filtered `(left, right)` pair.
    pub fn ingest(&mut self, raw_left: i32, raw_right: i32) -> (i32, i32) {
        let (cal_left, cal_right) = self.calibration.apply(raw_left, raw_right);
        let filtered = (self.left.push(cal_left), self.right.push(cal_right));
        self.last_filtered = filtered;
        filtered
    }

    /// The most recent filtered pair, for ticks where the ADC read failed
    /// and the caller explicitly wants the stale value.
    pub fn last_filtered(&self) -> (i32, i32) {
        self.last_filtered
    }

    /// Read-only view of the active calibration.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Installs a new calibration and flushes the filter windows so stale
    /// pre-calibration samples cannot bleed into the first filtered reads.
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
        self.left.clear();
        self.right.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_applies_floor_and_offset() {
        let cal = Calibration {
            noise_floor_left: 105,
            noise_floor_right: 120,
            rssi_offset: -15,
            ..Calibration::default()
        };
        assert_eq!(cal.apply(605, 620), (500, 485));
    }

    #[test]
    fn below_floor_values_stay_negative() {
        let cal = Calibration {
            noise_floor_left: 100,
            noise_floor_right: 100,
            rssi_offset: 0,
            ..Calibration::default()
        };
        assert_eq!(cal.apply(80, 90), (-20, -10));
    }

    #[test]
    fn window_of_one_disables_averaging() {
        let mut pipeline = RssiPipeline::new(1);
        let cal = Calibration {
            noise_floor_left: 10,
            noise_floor_right: 20,
            rssi_offset: 5,
            ..Calibration::default()
        };
        pipeline.set_calibration(cal);
        assert_eq!(pipeline.ingest(110, 120), (100, 105));
        assert_eq!(pipeline.ingest(210, 220), (200, 205));
    }

    #[test]
    fn moving_average_evicts_oldest() {
        let mut avg = MovingAverage::new(3);
        assert_eq!(avg.push(10), 10);
        assert_eq!(avg.push(20), 15);
        assert_eq!(avg.push(30), 20);
        // 10 falls out of the window.
        assert_eq!(avg.push(40), 30);
    }

    #[test]
    fn empty_window_returns_last_sample() {
        let mut avg = MovingAverage::new(4);
        let _ = avg.push(77);
        avg.clear();
        assert_eq!(avg.mean(), 77);
    }

    #[test]
    fn oversized_window_is_clamped_to_capacity() {
        let avg = MovingAverage::new(10 * RSSI_FILTER_CAP);
        assert_eq!(avg.len, RSSI_FILTER_CAP);
    }

    #[test]
    fn new_calibration_flushes_windows() {
        let mut pipeline = RssiPipeline::new(4);
        let _ = pipeline.ingest(1000, 1000);
        let _ = pipeline.ingest(1000, 1000);
        pipeline.set_calibration(Calibration {
            noise_floor_left: 500,
            noise_floor_right: 500,
            rssi_offset: 0,
            ..Calibration::default()
        });
        // The window only holds the one post-calibration sample.
        assert_eq!(pipeline.ingest(600, 700), (100, 200));
    }
}
