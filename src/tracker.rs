//! The central tracking state machine.
//!
//! One [`TrackerCore`] owns the servo bus, the RSSI converter and the
//! calibration/filter pipeline, and advances one state-tick per call to
//! [`tick()`](TrackerCore::tick) (nominally 10 Hz). External commands are
//! applied between ticks through [`handle_command`](TrackerCore::handle_command).
//!
//! States:
//!
//! - **Manual** — moves only on command, keeps publishing RSSI and health.
//! - **Auto** — differential proportional controller: move against the
//!   stronger antenna, step and speed scaled by |L−R|, rate-limited by a
//!   per-move cooldown.
//! - **Scan** — sweep the whole travel range station by station, then park
//!   on the station with the most symmetric reception and hand over to Auto.
//! - **CalibrateMin / CalibrateMax** — sample for a fixed window and derive
//!   noise floors / channel offset (min) or informational maxima (max).
//! - **Idle** — pre-init; everything except [`start`](TrackerCore::start)
//!   is refused.
//!
//! Steady-state hardware hiccups are logged and skipped (the next tick
//! retries); a servo that reports a hardware fault status escapes to the
//! caller, which drops the system to Manual.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal_nb::serial::{Read, Write};
use thiserror::Error;

use crate::adc::Ads1115;
use crate::angle::AngleMap;
use crate::clock::{Clock, Cooldown};
use crate::command::{Command, InvalidCommand};
use crate::config::{ConfigError, TrackerConfig};
use crate::consts::{
    MOVE_SUPPRESS_UNITS, SCAN_MIN_SAMPLES, SCAN_READS_PER_STEP, SCAN_READ_INTERVAL_MS,
    SCAN_WAIT_IDLE_MS,
};
use crate::macros::{info, warn};
use crate::rssi::RssiPipeline;
use crate::servo::{ServoDriver, ServoError, ServoStatus};
use crate::status::{ScanData, ScanResults, ScanSample, TrackerStatus, VtxScanStatus, VtxStatus};
use crate::vtx::{frequency_mhz, ChannelSelector};

/// Operating mode of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize),
    serde(rename_all = "snake_case")
)]
pub enum Mode {
    /// Pre-init; hardware not proven yet.
    Idle,
    /// Motion only on command.
    Manual,
    /// Differential tracking controller active.
    Auto,
    /// Angular boresight scan in progress.
    Scan,
    /// Noise-floor calibration pass in progress.
    CalibrateMin,
    /// Maximum-signal calibration pass in progress.
    CalibrateMax,
}

/// Failures surfaced by the core.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TrackerError {
    /// A required device failed its startup probe. Fatal: the core stays
    /// in [`Mode::Idle`].
    #[error("hardware unavailable: {0}")]
    HwUnavailable(&'static str),
    /// A command arrived before [`TrackerCore::start`] succeeded.
    #[error("tracker has not been started")]
    NotStarted,
    /// The command was unknown or carried invalid parameters.
    #[error("invalid command")]
    InvalidCommand,
    /// The servo reported a hardware fault status.
    #[error(transparent)]
    Servo(ServoError),
    /// A foreground receiver operation failed.
    #[error("vtx channel select failed")]
    VtxSetFailed,
}

impl From<InvalidCommand> for TrackerError {
    fn from(_: InvalidCommand) -> Self {
        TrackerError::InvalidCommand
    }
}

/// Runtime motion range, seeded from configuration and mutated by the
/// limit-capture commands.
#[derive(Debug, Clone, Copy)]
struct MotionRange {
    left: i32,
    right: i32,
    center: i32,
}

impl MotionRange {
    fn clamp(&self, position: i32) -> i32 {
        position.clamp(self.left, self.right)
    }
}

#[derive(Debug)]
struct ScanState {
    pos: i32,
    samples: ScanData,
}

#[derive(Debug)]
struct CalState {
    max_pass: bool,
    sum_left: i64,
    sum_right: i64,
    count: u32,
}

#[cfg(feature = "std")]
fn push_sample(data: &mut ScanData, sample: ScanSample) -> bool {
    data.push(sample);
    true
}

#[cfg(not(feature = "std"))]
fn push_sample(data: &mut ScanData, sample: ScanSample) -> bool {
    data.push(sample).is_ok()
}

/// Picks the scan entry to park on: minimum |L−R|, optionally smoothed
/// over a 3-point window, optionally gated on total signal.
fn select_best(samples: &[ScanSample], smoothing: bool, min_total: Option<i32>) -> Option<usize> {
    let metric = |i: usize| -> i32 {
        if smoothing {
            let lo = i.saturating_sub(1);
            let hi = (i + 2).min(samples.len());
            let sum: i64 = samples[lo..hi].iter().map(|s| i64::from(s.difference)).sum();
            (sum / (hi - lo) as i64) as i32
        } else {
            samples[i].difference
        }
    };
    (0..samples.len())
        .filter(|&i| min_total.is_none_or(|min| samples[i].total_rssi >= min))
        .min_by_key(|&i| metric(i))
}

/// The tracking and scanning engine.
///
/// Generic over the servo serial port `P`, the ADC bus `I2C`, the shared
/// receiver handle `V`, the delay provider `D` and the clock `C`, so the
/// whole machine runs against simulated hardware in tests.
#[derive(Debug)]
pub struct TrackerCore<P, I2C, V, D, C> {
    config: TrackerConfig,
    servo: ServoDriver<P, C>,
    adc: Ads1115<I2C>,
    vtx: V,
    delay: D,
    clock: C,
    pipeline: RssiPipeline,
    range: MotionRange,
    mode: Mode,
    commanded: i32,
    cooldown: Cooldown,
    scan: Option<ScanState>,
    cal: Option<CalState>,
    scan_results: Option<ScanResults>,
    servo_health: ServoStatus,
    servo_io_ok: bool,
    display_rssi: (i32, i32),
    vtx_error: Option<&'static str>,
    started: bool,
}

impl<P, I2C, V, D, C, E> TrackerCore<P, I2C, V, D, C>
where
    P: Read<u8> + Write<u8>,
    I2C: I2c<Error = E>,
    V: ChannelSelector,
    D: DelayNs,
    C: Clock,
{
    /// Builds the core from validated configuration and the injected
    /// hardware handles. No bus traffic happens here; see [`start`](Self::start).
    pub fn new(
        config: TrackerConfig,
        port: P,
        i2c: I2C,
        vtx: V,
        delay: D,
        clock: C,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let servo = ServoDriver::new(port, clock.clone(), config.timing.servo_io_timeout_ms);
        let adc = Ads1115::new(i2c, config.adc.address, config.adc.gain);
        let range = MotionRange {
            left: config.servo.left_limit,
            right: config.servo.right_limit,
            center: config.servo.center_pos,
        };
        Ok(Self {
            pipeline: RssiPipeline::new(config.rssi_filter_len),
            cooldown: Cooldown::new(config.auto.cooldown_ms),
            commanded: range.center,
            config,
            servo,
            adc,
            vtx,
            delay,
            clock,
            range,
            mode: Mode::Idle,
            scan: None,
            cal: None,
            scan_results: None,
            servo_health: ServoStatus::default(),
            servo_io_ok: false,
            display_rssi: (0, 0),
            vtx_error: None,
            started: false,
        })
    }

    /// Probes the hardware, centers the pan stage and kicks off the boot
    /// sweep. Failure is fatal: the core stays in [`Mode::Idle`] and
    /// refuses all commands.
    pub fn start(&mut self) -> Result<(), TrackerError> {
        let id = self.config.servo.id;
        let model = self
            .servo
            .ping(id)
            .map_err(|_| TrackerError::HwUnavailable("servo did not answer ping"))?;
        info!("pan servo online, model {}", model);
        self.servo
            .set_mode_position(id)
            .map_err(|_| TrackerError::HwUnavailable("servo mode write failed"))?;
        self.servo
            .set_torque(id, true)
            .map_err(|_| TrackerError::HwUnavailable("servo torque enable failed"))?;
        let _ = self
            .adc
            .read(self.config.adc.left_channel, &mut self.delay)
            .map_err(|_| TrackerError::HwUnavailable("rssi adc read failed"))?;

        self.started = true;
        self.mode = Mode::Manual;
        self.move_to(self.range.center, self.config.servo.manual_speed)
            .map_err(|_| TrackerError::HwUnavailable("initial centering failed"))?;

        // One boresight sweep at every boot.
        self.begin_scan()
    }

    /// Applies one external command. Returns an error (and leaves the
    /// state machine unchanged) for invalid commands or commands the
    /// hardware refused.
    pub fn handle_command(&mut self, command: Command) -> Result<(), TrackerError> {
        command.validate()?;
        if !self.started {
            return Err(TrackerError::NotStarted);
        }
        match command {
            Command::Left => {
                self.enter_manual();
                let target = self.commanded - self.config.servo.step_units;
                self.move_to(target, self.config.servo.manual_speed)
                    .map_err(TrackerError::Servo)
            }
            Command::Right => {
                self.enter_manual();
                let target = self.commanded + self.config.servo.step_units;
                self.move_to(target, self.config.servo.manual_speed)
                    .map_err(TrackerError::Servo)
            }
            Command::Home => {
                self.enter_manual();
                self.move_to(self.range.center, self.config.servo.manual_speed)
                    .map_err(TrackerError::Servo)
            }
            Command::SetAngle { degrees } => {
                self.enter_manual();
                let target = self.angle_map().angle_to_position(degrees);
                self.move_to(target, self.config.servo.manual_speed)
                    .map_err(TrackerError::Servo)
            }
            Command::Manual => {
                self.enter_manual();
                Ok(())
            }
            Command::Auto => {
                self.clear_activities();
                self.mode = Mode::Auto;
                info!("mode: auto tracking");
                Ok(())
            }
            Command::Scan => {
                if self.mode == Mode::Scan {
                    return Ok(());
                }
                self.begin_scan()
            }
            Command::Calibrate => {
                if self.mode != Mode::CalibrateMin {
                    self.begin_calibration(false);
                }
                Ok(())
            }
            Command::CalibrateMax => {
                if self.mode != Mode::CalibrateMax {
                    self.begin_calibration(true);
                }
                Ok(())
            }
            Command::SetCenter | Command::SetLeftLimit | Command::SetRightLimit => {
                self.capture_limit(command)
            }
            Command::VtxSet { band, channel } => match self.vtx.select(band, channel) {
                Ok(()) => {
                    self.vtx_error = None;
                    info!("vtx tuned to {}{}", band.letter(), channel);
                    Ok(())
                }
                Err(_) => {
                    self.vtx_error = Some("channel select failed");
                    Err(TrackerError::VtxSetFailed)
                }
            },
            Command::VtxMode { mode } => match self.vtx.set_video_mode(mode) {
                Ok(()) => {
                    self.vtx_error = None;
                    Ok(())
                }
                Err(_) => {
                    self.vtx_error = Some("video mode switch failed");
                    Err(TrackerError::VtxSetFailed)
                }
            },
            // Serviced by the runtime dispatcher, never by the core.
            Command::VtxScanStart { .. } => Err(TrackerError::InvalidCommand),
        }
    }

    /// Executes one state-tick.
    ///
    /// Transient bus problems are logged and retried next tick; a servo
    /// hardware fault escapes so the host can drop to Manual and back off.
    pub fn tick(&mut self) -> Result<(), TrackerError> {
        if !self.started {
            return Ok(());
        }
        match self.mode {
            Mode::Idle => Ok(()),
            Mode::Manual => {
                self.tick_monitor();
                Ok(())
            }
            Mode::Auto => self.tick_auto(),
            Mode::Scan => self.tick_scan(),
            Mode::CalibrateMin | Mode::CalibrateMax => {
                self.tick_calibrate();
                Ok(())
            }
        }
    }

    /// Copy-on-read snapshot of the tracker. The band-scan portion is
    /// empty here; the runtime merges it from the scan worker.
    pub fn status(&self) -> TrackerStatus {
        let map = self.angle_map();
        TrackerStatus {
            mode: self.mode,
            angle: self.commanded,
            angle_degrees: map.position_to_angle(self.commanded),
            rssi_a: self.display_rssi.0,
            rssi_b: self.display_rssi.1,
            servo_moving: self.servo_health.moving,
            servo_voltage_v: f32::from(self.servo_health.voltage_dv) / 10.0,
            servo_temperature_c: i32::from(self.servo_health.temperature_c),
            vtx: self.vtx_status(),
            vtx_scan: VtxScanStatus::default(),
            timestamp_s: self.clock.now_s(),
        }
    }

    /// Results of the most recent angular scan, until the next scan starts.
    pub fn scan_results(&self) -> Option<&ScanResults> {
        self.scan_results.as_ref()
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The validated configuration the core runs with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Commanded servo position, units.
    pub fn commanded_position(&self) -> i32 {
        self.commanded
    }

    /// Whether the last servo exchange succeeded.
    pub fn servo_io_ok(&self) -> bool {
        self.servo_io_ok
    }

    /// The active RSSI calibration.
    pub fn calibration(&self) -> crate::rssi::Calibration {
        *self.pipeline.calibration()
    }

    /// Installs a calibration loaded from persistent storage.
    pub fn restore_calibration(&mut self, calibration: crate::rssi::Calibration) {
        self.pipeline.set_calibration(calibration);
    }

    // -- mode internals ----------------------------------------------------

    fn angle_map(&self) -> AngleMap {
        AngleMap::new(self.range.left, self.range.right, self.config.servo.span_degrees)
    }

    fn enter_manual(&mut self) {
        self.clear_activities();
        if self.mode != Mode::Manual {
            self.mode = Mode::Manual;
            info!("mode: manual");
        }
    }

    /// Drops any in-flight scan or calibration; their partial data is
    /// discarded.
    fn clear_activities(&mut self) {
        self.scan = None;
        self.cal = None;
    }

    fn begin_scan(&mut self) -> Result<(), TrackerError> {
        self.clear_activities();
        self.scan_results = None;
        self.mode = Mode::Scan;
        info!("scan: sweeping from {} to {}", self.range.left, self.range.right);
        self.move_to(self.range.left, self.config.servo.scan_speed)
            .map_err(TrackerError::Servo)?;
        self.scan = Some(ScanState {
            pos: self.range.left,
            samples: ScanData::new(),
        });
        Ok(())
    }

    fn begin_calibration(&mut self, max_pass: bool) {
        self.clear_activities();
        self.mode = if max_pass {
            Mode::CalibrateMax
        } else {
            Mode::CalibrateMin
        };
        self.cal = Some(CalState {
            max_pass,
            sum_left: 0,
            sum_right: 0,
            count: 0,
        });
        info!("calibration pass started (max={})", max_pass);
    }

    fn capture_limit(&mut self, which: Command) -> Result<(), TrackerError> {
        self.enter_manual();
        // Let the mechanism come to rest so the captured position is real.
        match self.servo.wait_idle(
            self.config.servo.id,
            self.config.timing.wait_idle_ms,
            &mut self.delay,
        ) {
            Ok(_) => {}
            Err(error) => return Err(TrackerError::Servo(error)),
        }
        let actual = match self.servo.read_position(self.config.servo.id) {
            Ok(position) => i32::from(position),
            Err(error) => return Err(TrackerError::Servo(error)),
        };
        match which {
            Command::SetCenter => {
                self.range.center = self.range.clamp(actual);
            }
            Command::SetLeftLimit => {
                if actual >= self.range.right {
                    return Err(TrackerError::InvalidCommand);
                }
                self.range.left = actual;
                self.range.center = self.range.clamp(self.range.center);
            }
            Command::SetRightLimit => {
                if actual <= self.range.left {
                    return Err(TrackerError::InvalidCommand);
                }
                self.range.right = actual;
                self.range.center = self.range.clamp(self.range.center);
            }
            _ => return Err(TrackerError::InvalidCommand),
        }
        self.commanded = self.range.clamp(self.commanded);
        info!(
            "range captured: left={} center={} right={}",
            self.range.left, self.range.center, self.range.right
        );
        Ok(())
    }

    /// Clamps, suppresses no-op moves and issues the position write.
    /// After a successful write the commanded position reflects the
    /// clamped target even while the mechanism is still getting there.
    fn move_to(&mut self, target: i32, speed: u16) -> Result<(), ServoError> {
        let target = self.range.clamp(target);
        if target == self.commanded {
            return Ok(());
        }
        let result = self.servo.write_position(
            self.config.servo.id,
            target as u16,
            speed,
            self.config.servo.accel,
        );
        self.servo_io_ok = result.is_ok();
        result?;
        self.commanded = target;
        Ok(())
    }

    fn read_rssi(&mut self) -> Result<(i32, i32), ()> {
        let raw_left = self
            .adc
            .read(self.config.adc.left_channel, &mut self.delay)
            .map_err(|_| ())?;
        let raw_right = self
            .adc
            .read(self.config.adc.right_channel, &mut self.delay)
            .map_err(|_| ())?;
        let pair = self
            .pipeline
            .ingest(i32::from(raw_left), i32::from(raw_right));
        self.display_rssi = pair;
        Ok(pair)
    }

    fn refresh_servo_health(&mut self) {
        match self.servo.read_status(self.config.servo.id) {
            Ok(status) => {
                self.servo_health = status;
                self.servo_io_ok = true;
            }
            Err(_) => {
                self.servo_io_ok = false;
                warn!("servo status read failed, keeping last reading");
            }
        }
    }

    fn tick_monitor(&mut self) {
        if self.read_rssi().is_err() {
            warn!("rssi read failed, skipping tick");
        }
        self.refresh_servo_health();
    }

    fn tick_auto(&mut self) -> Result<(), TrackerError> {
        let Ok((left, right)) = self.read_rssi() else {
            warn!("rssi read failed, skipping correction");
            return Ok(());
        };
        self.refresh_servo_health();

        let diff = left - right;
        if diff.abs() < self.config.auto.deadband {
            return Ok(());
        }
        let Some((step, speed)) = self.auto_step(diff.abs()) else {
            return Ok(());
        };
        let now = self.clock.now_ms();
        if !self.cooldown.ready(now) {
            return Ok(());
        }
        // Left stronger: turn toward smaller positions, and vice versa.
        let target = if diff > 0 {
            self.commanded - step
        } else {
            self.commanded + step
        };
        let target = self.range.clamp(target);
        if (target - self.commanded).abs() < MOVE_SUPPRESS_UNITS {
            return Ok(());
        }
        match self.servo.write_position(
            self.config.servo.id,
            target as u16,
            speed,
            self.config.servo.accel,
        ) {
            Ok(()) => {
                self.servo_io_ok = true;
                self.commanded = target;
                self.cooldown.mark(now);
            }
            Err(ServoError::Device(code)) => {
                self.servo_io_ok = false;
                return Err(TrackerError::Servo(ServoError::Device(code)));
            }
            Err(_) => {
                self.servo_io_ok = false;
                warn!("corrective move failed, retrying next tick");
            }
        }
        Ok(())
    }

    /// Piecewise step table keyed on |L−R| in threshold multiples.
    fn auto_step(&self, magnitude: i32) -> Option<(i32, u16)> {
        let auto = &self.config.auto;
        let t = auto.rssi_threshold;
        if magnitude < t {
            None
        } else if magnitude < 2 * t {
            Some((auto.step_small, auto.speed))
        } else if magnitude < 4 * t {
            Some((auto.step_medium, auto.speed + auto.speed_boost_medium))
        } else {
            Some((auto.step_large, auto.speed + auto.speed_boost_large))
        }
    }

    fn tick_scan(&mut self) -> Result<(), TrackerError> {
        let Some(pos) = self.scan.as_ref().map(|s| s.pos) else {
            self.mode = Mode::Manual;
            return Ok(());
        };

        match self.servo.wait_idle(self.config.servo.id, SCAN_WAIT_IDLE_MS, &mut self.delay) {
            Ok(_) => {}
            Err(ServoError::Device(code)) => {
                return Err(TrackerError::Servo(ServoError::Device(code)))
            }
            Err(_) => {
                warn!("scan: settle poll failed, retrying station");
                return Ok(());
            }
        }

        let mut sum_left = 0i64;
        let mut sum_right = 0i64;
        for i in 0..SCAN_READS_PER_STEP {
            let Ok((left, right)) = self.read_rssi() else {
                warn!("scan: rssi read failed, retrying station");
                return Ok(());
            };
            sum_left += i64::from(left);
            sum_right += i64::from(right);
            if i + 1 < SCAN_READS_PER_STEP {
                self.delay.delay_ms(SCAN_READ_INTERVAL_MS);
            }
        }
        let left = (sum_left / i64::from(SCAN_READS_PER_STEP)) as i32;
        let right = (sum_right / i64::from(SCAN_READS_PER_STEP)) as i32;
        let sample = ScanSample {
            position: pos,
            angle: self.angle_map().position_to_angle(pos),
            left_rssi: left,
            right_rssi: right,
            total_rssi: left + right,
            difference: (left - right).abs(),
        };

        let next = pos + self.config.scan.step_units;
        let mut full = false;
        if let Some(state) = self.scan.as_mut() {
            full = !push_sample(&mut state.samples, sample);
            state.pos = next;
        }
        if full || next > self.range.right {
            return self.finish_scan();
        }
        match self.move_to(next, self.config.servo.scan_speed) {
            Ok(()) => Ok(()),
            Err(ServoError::Device(code)) => Err(TrackerError::Servo(ServoError::Device(code))),
            Err(_) => {
                warn!("scan: traverse move failed, retrying");
                // Walk the station pointer back so the retry re-measures it.
                if let Some(state) = self.scan.as_mut() {
                    state.pos = pos;
                    let _ = state.samples.pop();
                }
                Ok(())
            }
        }
    }

    fn finish_scan(&mut self) -> Result<(), TrackerError> {
        let Some(state) = self.scan.take() else {
            self.mode = Mode::Manual;
            return Ok(());
        };
        let samples = state.samples;
        let timestamp_s = self.clock.now_s();

        if samples.len() < SCAN_MIN_SAMPLES {
            warn!("scan: only {} stations recorded, aborting", samples.len());
            self.scan_results = Some(ScanResults {
                scan_complete: false,
                timestamp_s,
                best_position: self.commanded,
                best_angle: self.angle_map().position_to_angle(self.commanded),
                min_difference: 0,
                scan_data: samples,
            });
            self.mode = Mode::Manual;
            return Ok(());
        }

        let selected = select_best(
            &samples,
            self.config.scan.smoothing,
            self.config.scan.min_total,
        );
        let Some(index) = selected else {
            warn!("scan: no station passed the total-signal gate");
            self.scan_results = Some(ScanResults {
                scan_complete: false,
                timestamp_s,
                best_position: self.commanded,
                best_angle: self.angle_map().position_to_angle(self.commanded),
                min_difference: 0,
                scan_data: samples,
            });
            self.mode = Mode::Manual;
            return Ok(());
        };

        let best = samples[index];
        info!(
            "scan: best station {} ({} deg), |L-R|={}",
            best.position, best.angle, best.difference
        );
        match self.move_to(best.position, self.config.servo.manual_speed) {
            Ok(()) => {}
            Err(ServoError::Device(code)) => {
                return Err(TrackerError::Servo(ServoError::Device(code)))
            }
            Err(_) => warn!("scan: final positioning move failed"),
        }
        self.scan_results = Some(ScanResults {
            scan_complete: true,
            timestamp_s,
            best_position: best.position,
            best_angle: best.angle,
            min_difference: best.difference,
            scan_data: samples,
        });
        self.mode = Mode::Auto;
        info!("scan complete, switching to auto tracking");
        Ok(())
    }

    fn tick_calibrate(&mut self) {
        let max_pass = self.mode == Mode::CalibrateMax;
        let sample = if max_pass {
            // Through the pipeline: measures the calibrated, filtered signal.
            self.read_rssi().ok()
        } else {
            // Raw counts: this pass *defines* the calibration.
            let left = self
                .adc
                .read(self.config.adc.left_channel, &mut self.delay);
            let right = self
                .adc
                .read(self.config.adc.right_channel, &mut self.delay);
            match (left, right) {
                (Ok(l), Ok(r)) => {
                    self.display_rssi = (i32::from(l), i32::from(r));
                    Some(self.display_rssi)
                }
                _ => None,
            }
        };
        let Some((left, right)) = sample else {
            warn!("calibration: sample read failed, skipping");
            return;
        };
        let target = self.config.calibration_samples();
        let mut done = false;
        if let Some(cal) = self.cal.as_mut() {
            cal.sum_left += i64::from(left);
            cal.sum_right += i64::from(right);
            cal.count += 1;
            done = cal.count >= target;
        }
        if done {
            self.finish_calibration();
        }
    }

    fn finish_calibration(&mut self) {
        let Some(cal) = self.cal.take() else {
            return;
        };
        let mean_left = (cal.sum_left / i64::from(cal.count)) as i32;
        let mean_right = (cal.sum_right / i64::from(cal.count)) as i32;
        let mut calibration = *self.pipeline.calibration();
        if cal.max_pass {
            calibration.rssi_max_left = Some(mean_left);
            calibration.rssi_max_right = Some(mean_right);
            info!("calibration max: L={} R={}", mean_left, mean_right);
        } else {
            calibration.noise_floor_left = mean_left;
            calibration.noise_floor_right = mean_right;
            calibration.rssi_offset = mean_left - mean_right;
            info!(
                "calibration floor: L={} R={} offset={}",
                mean_left, mean_right, calibration.rssi_offset
            );
        }
        self.pipeline.set_calibration(calibration);
        self.mode = Mode::Manual;
    }

    fn vtx_status(&self) -> VtxStatus {
        match self.vtx.selected() {
            Some((band, channel)) => VtxStatus {
                band,
                channel,
                frequency_mhz: frequency_mhz(band, channel).unwrap_or(0),
                initialized: true,
                error: self.vtx_error,
            },
            None => VtxStatus {
                error: self.vtx_error,
                ..VtxStatus::default()
            },
        }
    }
}
