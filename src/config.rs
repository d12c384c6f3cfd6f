//! Static configuration for the tracker, validated once at startup.
//!
//! Every limit, gain, step size and timing value the state machine uses
//! lives here. Defaults come from [`crate::consts`] and match the deployed
//! mechanism (a 146° pan stage between servo units 1100 and 2700). Nothing
//! in this module talks to hardware; [`TrackerConfig::validate`] only
//! checks internal consistency so the control loop can rely on the numbers
//! without re-checking them every tick.

use thiserror::Error;

use crate::adc::Gain;
use crate::consts::{
    CALIBRATION_RATE_HZ, CALIBRATION_SECONDS, DEFAULT_ACCEL, DEFAULT_ADC_ADDRESS, DEFAULT_ADC_BUS,
    DEFAULT_AUTO_SPEED, DEFAULT_CENTER_POS, DEFAULT_COOLDOWN_MS, DEFAULT_DEADBAND,
    DEFAULT_LEFT_CHANNEL, DEFAULT_LEFT_LIMIT, DEFAULT_MANUAL_SPEED, DEFAULT_RIGHT_CHANNEL,
    DEFAULT_RIGHT_LIMIT, DEFAULT_RSSI_FILTER_LEN, DEFAULT_RSSI_THRESHOLD, DEFAULT_SCAN_SPEED,
    DEFAULT_SCAN_STEP_UNITS, DEFAULT_SERVO_ID, DEFAULT_SERVO_IO_TIMEOUT_MS, DEFAULT_SPAN_DEGREES,
    DEFAULT_SPEED_BOOST_LARGE, DEFAULT_SPEED_BOOST_MEDIUM, DEFAULT_STEP_UNITS, DEFAULT_TICK_MS,
    DEFAULT_WAIT_IDLE_MS, RSSI_FILTER_CAP, SCAN_MAX_SAMPLES,
};

/// A rejected configuration, with the offending field named.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The motion limits are not ordered `0 <= left < center < right <= 4095`.
    #[error("motion limits out of order: left={left} center={center} right={right}")]
    Limits {
        /// Configured left limit.
        left: i32,
        /// Configured center position.
        center: i32,
        /// Configured right limit.
        right: i32,
    },
    /// A step size is zero or negative.
    #[error("step sizes must be positive")]
    Step,
    /// The angular span is not a positive number of degrees.
    #[error("span must be positive degrees")]
    Span,
    /// The RSSI filter window is zero or exceeds the buffer capacity.
    #[error("rssi filter length {0} outside 1..={RSSI_FILTER_CAP}")]
    FilterLen(usize),
    /// The scan step would record more entries than the scan buffer holds.
    #[error("scan step {0} would overflow the scan record buffer")]
    ScanStep(i32),
    /// An ADC channel index is outside `0..=3`, or both antennas share one.
    #[error("bad adc channel assignment {left}/{right}")]
    AdcChannels {
        /// Configured left-antenna channel.
        left: u8,
        /// Configured right-antenna channel.
        right: u8,
    },
    /// The controller thresholds are not positive.
    #[error("rssi threshold and deadband must be positive")]
    Thresholds,
    /// The per-transaction servo bus deadline is unbounded or too large for
    /// the control loop cadence.
    #[error("servo io timeout {0} ms outside 1..=100")]
    IoTimeout(u32),
}

/// Pan servo identity, motion range and speeds.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServoConfig {
    /// Bus id of the servo.
    pub id: u8,
    /// Mechanical center, in servo units.
    pub center_pos: i32,
    /// Left travel limit, in servo units.
    pub left_limit: i32,
    /// Right travel limit, in servo units.
    pub right_limit: i32,
    /// Angular span between the limits, in degrees.
    pub span_degrees: f32,
    /// Manual step per `left`/`right` command, in servo units.
    pub step_units: i32,
    /// Speed for manual and post-scan positioning moves.
    pub manual_speed: u16,
    /// Speed for scan traversal moves.
    pub scan_speed: u16,
    /// Acceleration applied to every position write.
    pub accel: u8,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_SERVO_ID,
            center_pos: DEFAULT_CENTER_POS,
            left_limit: DEFAULT_LEFT_LIMIT,
            right_limit: DEFAULT_RIGHT_LIMIT,
            span_degrees: DEFAULT_SPAN_DEGREES,
            step_units: DEFAULT_STEP_UNITS,
            manual_speed: DEFAULT_MANUAL_SPEED,
            scan_speed: DEFAULT_SCAN_SPEED,
            accel: DEFAULT_ACCEL,
        }
    }
}

/// ADC wiring: address, bus and channel assignment. Immutable after init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdcConfig {
    /// I²C address of the converter.
    pub address: u8,
    /// I²C bus id (informational; the bus handle is injected).
    pub bus: u8,
    /// Full-scale gain selection.
    pub gain: Gain,
    /// Single-ended channel wired to the left antenna.
    pub left_channel: u8,
    /// Single-ended channel wired to the right antenna.
    pub right_channel: u8,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADC_ADDRESS,
            bus: DEFAULT_ADC_BUS,
            gain: Gain::Fsr2V048,
            left_channel: DEFAULT_LEFT_CHANNEL,
            right_channel: DEFAULT_RIGHT_CHANNEL,
        }
    }
}

/// Differential controller gains for the Auto mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutoConfig {
    /// Minimum |L - R| before the piecewise step table engages.
    pub rssi_threshold: i32,
    /// Deadband around zero difference; below it nothing moves.
    pub deadband: i32,
    /// Step for differences in `[threshold, 2·threshold)`.
    pub step_small: i32,
    /// Step for differences in `[2·threshold, 4·threshold)`.
    pub step_medium: i32,
    /// Step for differences at or above `4·threshold`.
    pub step_large: i32,
    /// Base corrective speed.
    pub speed: u16,
    /// Speed boost for medium steps.
    pub speed_boost_medium: u16,
    /// Speed boost for large steps.
    pub speed_boost_large: u16,
    /// Minimum spacing between corrective moves, in milliseconds.
    pub cooldown_ms: u32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            deadband: DEFAULT_DEADBAND,
            step_small: DEFAULT_STEP_UNITS,
            step_medium: 2 * DEFAULT_STEP_UNITS,
            step_large: DEFAULT_SCAN_STEP_UNITS,
            speed: DEFAULT_AUTO_SPEED,
            speed_boost_medium: DEFAULT_SPEED_BOOST_MEDIUM,
            speed_boost_large: DEFAULT_SPEED_BOOST_LARGE,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
        }
    }
}

/// Angular scan shape and candidate selection options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// Distance between scan stations, in servo units.
    pub step_units: i32,
    /// Smooth |L - R| over a 3-point window before picking the best entry.
    pub smoothing: bool,
    /// Require at least this summed RSSI for an entry to be eligible as
    /// the boresight. `None` disables the gate.
    pub min_total: Option<i32>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            step_units: DEFAULT_SCAN_STEP_UNITS,
            smoothing: false,
            min_total: None,
        }
    }
}

/// Control loop and bus timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingConfig {
    /// Control loop cadence, in milliseconds.
    pub tick_ms: u32,
    /// Cap on waiting for the servo to come to rest outside a scan.
    pub wait_idle_ms: u32,
    /// Per-transaction servo reply deadline, in milliseconds.
    pub servo_io_timeout_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            wait_idle_ms: DEFAULT_WAIT_IDLE_MS,
            servo_io_timeout_ms: DEFAULT_SERVO_IO_TIMEOUT_MS,
        }
    }
}

/// The complete tracker configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackerConfig {
    /// Servo identity, range and speeds.
    pub servo: ServoConfig,
    /// ADC wiring.
    pub adc: AdcConfig,
    /// RSSI moving-average window length; 1 disables averaging.
    pub rssi_filter_len: usize,
    /// Auto controller gains.
    pub auto: AutoConfig,
    /// Angular scan options.
    pub scan: ScanConfig,
    /// Loop and bus timing.
    pub timing: TimingConfig,
}

impl TrackerConfig {
    /// Number of samples a calibration pass collects.
    pub fn calibration_samples(&self) -> u32 {
        CALIBRATION_SECONDS * CALIBRATION_RATE_HZ
    }

    /// Checks internal consistency. Called once before the tracker starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.servo;
        if s.left_limit < 0
            || s.right_limit > 4095
            || s.left_limit >= s.center_pos
            || s.center_pos >= s.right_limit
        {
            return Err(ConfigError::Limits {
                left: s.left_limit,
                center: s.center_pos,
                right: s.right_limit,
            });
        }
        if s.step_units <= 0 || self.scan.step_units <= 0 {
            return Err(ConfigError::Step);
        }
        if s.span_degrees <= 0.0 {
            return Err(ConfigError::Span);
        }
        if self.rssi_filter_len == 0 || self.rssi_filter_len > RSSI_FILTER_CAP {
            return Err(ConfigError::FilterLen(self.rssi_filter_len));
        }
        let stations = (s.right_limit - s.left_limit) / self.scan.step_units + 1;
        if stations as usize > SCAN_MAX_SAMPLES {
            return Err(ConfigError::ScanStep(self.scan.step_units));
        }
        let a = &self.adc;
        if a.left_channel > 3 || a.right_channel > 3 || a.left_channel == a.right_channel {
            return Err(ConfigError::AdcChannels {
                left: a.left_channel,
                right: a.right_channel,
            });
        }
        if self.auto.rssi_threshold <= 0 || self.auto.deadband <= 0 {
            return Err(ConfigError::Thresholds);
        }
        if self.auto.step_small <= 0 || self.auto.step_medium <= 0 || self.auto.step_large <= 0 {
            return Err(ConfigError::Step);
        }
        if self.timing.servo_io_timeout_ms == 0 || self.timing.servo_io_timeout_ms > 100 {
            return Err(ConfigError::IoTimeout(self.timing.servo_io_timeout_ms));
        }
        Ok(())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            servo: ServoConfig::default(),
            adc: AdcConfig::default(),
            rssi_filter_len: DEFAULT_RSSI_FILTER_LEN,
            auto: AutoConfig::default(),
            scan: ScanConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}
