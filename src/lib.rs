//! # monopulse
//!
//! A mono-pulse diversity antenna tracker engine for small aerial
//! vehicles: a single-axis pan servo is rotated until two physically
//! offset receive antennas see equal signal strength, which points the
//! boresight at the transmitter. The same core commands an RX5808-class
//! receiver and can sweep the whole 5.8 GHz band plan for the strongest
//! active channel.
//!
//! The engine couples three hardware transports:
//! - a half-duplex serial bus to an SMS/STS smart servo (pan axis),
//! - an I²C ADS1115 sampling the two antenna log-detectors (RSSI),
//! - three bit-banged GPIOs into the receiver's RTC6705 synthesizer.
//!
//! All hardware access goes through `embedded-hal` traits, so the entire
//! state machine — calibration, angular scanning, differential tracking,
//! band scanning — runs unmodified against simulated devices in tests and
//! against a Linux SBC's HAL in production.
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std` (default) | Threaded [`runtime`], [`clock::StdClock`]/[`clock::StdDelay`], `std` containers |
//! | `serde`     | Status/command (de)serialization and the persisted calibration record; implies `std` |
//! | `log`       | Emit state transitions and bus failures through the `log` facade |
//! | `defmt-0-3` | `defmt` formatting for the public enums |
//!
//! ## Usage
//!
//! ```no_run
//! use monopulse::clock::{StdClock, StdDelay};
//! use monopulse::command::Command;
//! use monopulse::config::TrackerConfig;
//! use monopulse::runtime::{Application, SharedVtx};
//! use monopulse::tracker::TrackerCore;
//! use monopulse::vtx::Rx5808;
//! # use embedded_hal_mock::eh1::digital::Mock as PinMock;
//! # use embedded_hal_mock::eh1::i2c::Mock as I2cMock;
//! # use embedded_hal_mock::eh1::serial::Mock as SerialMock;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     # let clk = PinMock::new(&[]);
//!     # let dat = PinMock::new(&[]);
//!     # let cs = PinMock::new(&[]);
//!     # let port: SerialMock<u8> = SerialMock::new(&[]);
//!     # let i2c = I2cMock::new(&[]);
//!     // clk/dat/cs, port and i2c come from your platform HAL.
//!     let vtx = SharedVtx::new(Rx5808::new(clk, dat, cs, StdDelay)?);
//!     let core = TrackerCore::new(
//!         TrackerConfig::default(),
//!         port,
//!         i2c,
//!         vtx.clone(),
//!         StdDelay,
//!         StdClock::new(),
//!     )?;
//!     let app = Application::launch(core, vtx)?;
//!     let handle = app.handle();
//!     handle.send(Command::Auto);
//!     # Ok(())
//! }
//! ```
//!
//! ## Integration notes
//!
//! - The control loop owns the servo and the ADC exclusively; collaborators
//!   talk to the tracker only through [`runtime::ControlHandle`].
//! - The receiver is shared between foreground tuning and the background
//!   band scan through [`runtime::SharedVtx`]'s mutex.
//! - Hardware probing is fatal at startup ([`tracker::TrackerCore::start`]);
//!   steady-state bus hiccups are logged and retried on the next tick.
//!
//! --
//! Designed for `#![no_std]` cores with a `std` host runtime on top.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod adc;
pub mod angle;
pub mod clock;
pub mod command;
pub mod config;
pub mod consts;
pub(crate) mod macros;
#[cfg(feature = "serde")]
pub mod persist;
pub mod rssi;
#[cfg(feature = "std")]
pub mod runtime;
pub mod servo;
#[cfg(test)]
#[allow(dead_code)]
pub(crate) mod sim;
pub mod status;
pub mod tracker;
pub mod vtx;
pub mod vtx_scan;

#[cfg(test)]
mod tests {
    use crate::command::Command;
    use crate::config::TrackerConfig;
    use crate::sim::{SimAdc, SimSelector, SimServoBus, TestClock, TestDelay};
    use crate::tracker::{Mode, TrackerCore};

    type SimCore = TrackerCore<SimServoBus, SimAdc, SimSelector, TestDelay, TestClock>;

    fn rig(config: TrackerConfig) -> (SimCore, SimServoBus, SimAdc) {
        let servo = SimServoBus::new();
        let adc = SimAdc::new();
        let clock = TestClock::new(0);
        let delay = TestDelay::new(&clock);
        let core = TrackerCore::new(
            config,
            servo.clone(),
            adc.clone(),
            SimSelector::new(),
            delay,
            clock,
        )
        .unwrap();
        (core, servo, adc)
    }

    fn unfiltered() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.rssi_filter_len = 1;
        config
    }

    /// Symmetric triangular field peaking at servo position 2000, as seen
    /// by an antenna mounted 60 units off boresight.
    fn triangular(x: i32) -> i32 {
        1500 - (x - 2000).abs() / 2
    }

    // Angular scan over a symmetric field: the station nearest the peak
    // minimizes |L-R|, the tracker parks there and hands over to Auto.
    #[test]
    fn angular_scan_finds_the_symmetry_point() {
        let (mut core, servo, adc) = rig(unfiltered());
        core.start().unwrap();
        assert_eq!(core.mode(), Mode::Scan);

        let mut guard = 0;
        while core.mode() == Mode::Scan {
            guard += 1;
            assert!(guard < 200, "scan did not terminate");
            let pos = i32::from(servo.state().position());
            let left = triangular(pos - 60) as i16;
            let right = triangular(pos + 60) as i16;
            adc.push_samples(1, &[left; 5]);
            adc.push_samples(0, &[right; 5]);
            core.tick().unwrap();
        }

        assert_eq!(core.mode(), Mode::Auto);
        let results = core.scan_results().unwrap().clone();
        assert!(results.scan_complete);
        // Stations every 33 units from 1100: ((2700 - 1100) / 33) + 1.
        assert_eq!(results.scan_data.len(), 49);
        assert_eq!(results.best_position, 1991);
        assert_eq!(core.commanded_position(), 1991);

        // The winner minimizes |L-R| over the whole record, and stations
        // were appended in strictly increasing position order.
        let min = results.scan_data.iter().map(|s| s.difference).min().unwrap();
        assert_eq!(results.min_difference, min);
        for pair in results.scan_data.windows(2) {
            assert!(pair[1].position > pair[0].position);
        }
    }

    // A manual command during the scan aborts at the station boundary:
    // no post-scan positioning move, partial record discarded.
    #[test]
    fn manual_command_aborts_scan_at_step_boundary() {
        let (mut core, _servo, adc) = rig(unfiltered());
        core.start().unwrap();

        for _ in 0..5 {
            adc.push_samples(1, &[900; 5]);
            adc.push_samples(0, &[900; 5]);
            core.tick().unwrap();
        }
        let before = core.commanded_position();

        core.handle_command(Command::Manual).unwrap();
        assert_eq!(core.mode(), Mode::Manual);
        assert!(core.scan_results().is_none());
        assert_eq!(core.commanded_position(), before);

        // The scan stays dead on subsequent ticks.
        adc.set_fallback(0, 100);
        adc.set_fallback(1, 100);
        for _ in 0..3 {
            core.tick().unwrap();
        }
        assert_eq!(core.mode(), Mode::Manual);
        assert!(core.scan_results().is_none());
    }

    // Boot flow over a flat field: the sweep completes, every station ties
    // at zero difference, the first one wins, and Auto takes over without
    // further motion.
    #[test]
    fn boot_flow_flat_field_parks_on_first_station() {
        let (mut core, _servo, adc) = rig(unfiltered());
        adc.set_fallback(0, 800);
        adc.set_fallback(1, 800);
        core.start().unwrap();

        let mut guard = 0;
        while core.mode() == Mode::Scan {
            guard += 1;
            assert!(guard < 200, "scan did not terminate");
            core.tick().unwrap();
        }

        assert_eq!(core.mode(), Mode::Auto);
        let results = core.scan_results().unwrap().clone();
        assert!(results.scan_complete);
        assert_eq!(results.min_difference, 0);
        assert_eq!(results.best_position, 1100);

        // Balanced field: the controller holds position through Auto ticks.
        for _ in 0..5 {
            core.tick().unwrap();
        }
        assert_eq!(core.commanded_position(), 1100);
    }

    // Underfilled scan: shrink the range so fewer than three stations fit,
    // which must abort to Manual with the partial record flagged.
    #[test]
    fn underfilled_scan_aborts_to_manual() {
        let mut config = unfiltered();
        config.servo.left_limit = 2000;
        config.servo.center_pos = 2030;
        config.servo.right_limit = 2060;
        config.scan.step_units = 33;
        let (mut core, _servo, adc) = rig(config);
        adc.set_fallback(0, 500);
        adc.set_fallback(1, 500);
        core.start().unwrap();

        let mut guard = 0;
        while core.mode() == Mode::Scan {
            guard += 1;
            assert!(guard < 20, "scan did not terminate");
            core.tick().unwrap();
        }

        assert_eq!(core.mode(), Mode::Manual);
        let results = core.scan_results().unwrap();
        assert!(!results.scan_complete);
        assert_eq!(results.scan_data.len(), 2);
    }
}
