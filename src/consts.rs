//! Constants used across the tracker implementation.
//!
//! This module defines the default motion limits, controller gains, timing
//! values, and buffer capacities shared by the drivers and the tracking
//! state machine.
//!
//! Motion values are expressed in raw servo units (0..4095 over a full
//! rotation); the mechanism is constrained to a sub-range of that. RSSI
//! values are expressed in ADC counts after calibration.
//!
//! All of these defaults can be overridden through [`crate::config`]; the
//! resulting configuration is validated once at startup.

/// Default serial bus id of the pan servo.
pub const DEFAULT_SERVO_ID: u8 = 1;

/// Default mechanical center, in servo units.
pub const DEFAULT_CENTER_POS: i32 = 2047;

/// Default left travel limit, in servo units.
pub const DEFAULT_LEFT_LIMIT: i32 = 1100;

/// Default right travel limit, in servo units.
pub const DEFAULT_RIGHT_LIMIT: i32 = 2700;

/// Angular span covered by the full travel range, in degrees.
///
/// With the default limits this works out to roughly 11 servo units per
/// degree: `(2700 - 1100) / 146 ≈ 11`.
pub const DEFAULT_SPAN_DEGREES: f32 = 146.0;

/// Default manual step, in servo units (about one degree).
pub const DEFAULT_STEP_UNITS: i32 = 11;

/// Default angular-scan step, in servo units (about three degrees).
pub const DEFAULT_SCAN_STEP_UNITS: i32 = 33;

/// Default servo speed for manual moves.
pub const DEFAULT_MANUAL_SPEED: u16 = 2400;

/// Default servo speed for scan traversal moves.
pub const DEFAULT_SCAN_SPEED: u16 = 3400;

/// Default base servo speed for corrective moves in Auto.
pub const DEFAULT_AUTO_SPEED: u16 = 1800;

/// Default speed boost applied to medium corrective moves.
pub const DEFAULT_SPEED_BOOST_MEDIUM: u16 = 600;

/// Default speed boost applied to large corrective moves.
pub const DEFAULT_SPEED_BOOST_LARGE: u16 = 1200;

/// Default servo acceleration for all position writes.
pub const DEFAULT_ACCEL: u8 = 50;

/// Default minimum |L - R| difference before the auto controller reacts.
pub const DEFAULT_RSSI_THRESHOLD: i32 = 15;

/// Default deadband around zero difference in which no corrective motion
/// is applied.
pub const DEFAULT_DEADBAND: i32 = 30;

/// Corrective moves closer than this to the current commanded position are
/// suppressed.
pub const MOVE_SUPPRESS_UNITS: i32 = 2;

/// Default minimum spacing between successive corrective moves.
pub const DEFAULT_COOLDOWN_MS: u32 = 100;

/// Default control loop cadence (10 Hz).
pub const DEFAULT_TICK_MS: u32 = 100;

/// Default moving-average window length for the RSSI filter.
pub const DEFAULT_RSSI_FILTER_LEN: usize = 5;

/// Capacity of the RSSI moving-average ring buffers. The configured window
/// length must not exceed this.
pub const RSSI_FILTER_CAP: usize = 32;

/// Maximum number of entries an angular scan can record.
pub const SCAN_MAX_SAMPLES: usize = 128;

/// Minimum number of scan entries required to pick a boresight.
pub const SCAN_MIN_SAMPLES: usize = 3;

/// Number of RSSI reads averaged per scan step.
pub const SCAN_READS_PER_STEP: u32 = 5;

/// Spacing between the RSSI reads of one scan step, in milliseconds.
pub const SCAN_READ_INTERVAL_MS: u32 = 50;

/// Cap on waiting for the servo to come to rest during a scan step.
pub const SCAN_WAIT_IDLE_MS: u32 = 500;

/// Cap on waiting for the servo to come to rest outside of a scan.
pub const DEFAULT_WAIT_IDLE_MS: u32 = 2_000;

/// Per-transaction serial reply deadline for the servo bus. Bounded so a
/// dead bus cannot stall the control loop.
pub const DEFAULT_SERVO_IO_TIMEOUT_MS: u32 = 50;

/// Duration of a noise-floor or maximum calibration pass, in seconds.
pub const CALIBRATION_SECONDS: u32 = 8;

/// Sampling rate during calibration, in Hertz.
pub const CALIBRATION_RATE_HZ: u32 = 10;

/// Minimum settle time after a VTX channel change before its RSSI is
/// trusted, in milliseconds. Scan requests below this are clamped up.
pub const VTX_SETTLE_FLOOR_MS: u32 = 700;

/// Default I²C address of the ADS1115 RSSI converter.
pub const DEFAULT_ADC_ADDRESS: u8 = 0x48;

/// Default I²C bus id the converter sits on.
pub const DEFAULT_ADC_BUS: u8 = 1;

/// Default ADC channel wired to the left antenna.
pub const DEFAULT_LEFT_CHANNEL: u8 = 1;

/// Default ADC channel wired to the right antenna.
pub const DEFAULT_RIGHT_CHANNEL: u8 = 0;
