//! Threaded host runtime: control loop, command dispatch, scan worker.
//!
//! Three tasks, exactly:
//!
//! - the **control loop** exclusively owns the [`TrackerCore`] (and with it
//!   the servo bus and the ADC), drains the command mailbox at the top of
//!   each tick and publishes a status snapshot after it;
//! - the **command dispatcher** is whoever calls [`ControlHandle::send`] —
//!   commands go into the single-slot mailbox, except `vtx_scan_start`,
//!   which launches the scan worker before returning;
//! - the **VTX scan worker** walks the band plan in the background. It
//!   never touches the ADC: it samples the filtered RSSI pair from the
//!   published status after each settle period. The receiver itself is
//!   shared with the control loop through [`SharedVtx`], and the mutex is
//!   never held across a sleep.
//!
//! A tick that surfaces an unexpected fault drops the core to Manual and
//! backs off for a second before resuming.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use embedded_hal_nb::serial::{Read, Write};

use crate::clock::Clock;
use crate::command::{Command, CommandMailbox};
use crate::macros::{info, warn};
use crate::status::{ScanResults, TrackerStatus};
use crate::tracker::{TrackerCore, TrackerError};
use crate::vtx::{Band, ChannelSelector, VideoMode, VtxError};
use crate::vtx_scan::{ScanBusy, VtxScanner};

/// Poison-tolerant lock: a panicked holder must not take the whole
/// tracker down with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutex-guarded receiver handle shared between the control loop and the
/// scan worker.
#[derive(Debug)]
pub struct SharedVtx<X> {
    inner: Arc<Mutex<X>>,
}

impl<X> SharedVtx<X> {
    /// Wraps a receiver driver for shared use.
    pub fn new(vtx: X) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vtx)),
        }
    }
}

impl<X> Clone for SharedVtx<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<X: ChannelSelector> ChannelSelector for SharedVtx<X> {
    fn select(&mut self, band: Band, channel: u8) -> Result<(), VtxError> {
        lock(&self.inner).select(band, channel)
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> Result<(), VtxError> {
        lock(&self.inner).set_video_mode(mode)
    }

    fn selected(&self) -> Option<(Band, u8)> {
        lock(&self.inner).selected()
    }
}

/// Cloneable front door for collaborators: command submission and
/// snapshot reads.
#[derive(Debug)]
pub struct ControlHandle<X> {
    mailbox: Arc<CommandMailbox>,
    status: Arc<Mutex<TrackerStatus>>,
    scan_results: Arc<Mutex<Option<ScanResults>>>,
    scanner: Arc<Mutex<VtxScanner>>,
    vtx: SharedVtx<X>,
    running: Arc<AtomicBool>,
}

impl<X> Clone for ControlHandle<X> {
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
            status: Arc::clone(&self.status),
            scan_results: Arc::clone(&self.scan_results),
            scanner: Arc::clone(&self.scanner),
            vtx: self.vtx.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<X> ControlHandle<X>
where
    X: ChannelSelector + Send + 'static,
{
    /// Submits a command. Returns whether it was accepted.
    ///
    /// Most commands go to the mailbox (latest wins) and are applied at the
    /// next tick. `vtx_scan_start` launches the scan worker synchronously;
    /// it is refused while a scan is in progress.
    pub fn send(&self, command: Command) -> bool {
        if command.validate().is_err() {
            warn!("rejecting invalid command");
            return false;
        }
        match command {
            Command::VtxScanStart { settle_ms } => self.start_vtx_scan(settle_ms).is_ok(),
            _ => {
                let _ = self.mailbox.post(command);
                true
            }
        }
    }

    /// The latest published snapshot, with live band-scan progress merged in.
    pub fn status(&self) -> TrackerStatus {
        let mut status = lock(&self.status).clone();
        status.vtx_scan = lock(&self.scanner).snapshot();
        status
    }

    /// Results of the last angular scan, if one has finished since boot.
    pub fn scan_results(&self) -> Option<ScanResults> {
        lock(&self.scan_results).clone()
    }

    /// Launches the band-scan worker. Fails if a scan is already running.
    pub fn start_vtx_scan(&self, settle_ms: Option<u32>) -> Result<(), ScanBusy> {
        let settle_ms = lock(&self.scanner).start(settle_ms)?;
        let scanner = Arc::clone(&self.scanner);
        let status = Arc::clone(&self.status);
        let vtx = self.vtx.clone();
        let spawned = thread::Builder::new()
            .name("vtx-scan".into())
            .spawn(move || vtx_scan_worker(scanner, vtx, status, settle_ms));
        if spawned.is_err() {
            warn!("vtx scan worker failed to spawn");
            lock(&self.scanner).abort();
            return Err(ScanBusy);
        }
        info!("vtx scan launched, settle {} ms", settle_ms);
        Ok(())
    }

}

impl<X> ControlHandle<X> {
    /// Asks the control loop to exit after its current tick.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

fn vtx_scan_worker<X: ChannelSelector>(
    scanner: Arc<Mutex<VtxScanner>>,
    mut vtx: SharedVtx<X>,
    status: Arc<Mutex<TrackerStatus>>,
    settle_ms: u32,
) {
    loop {
        let selected = lock(&scanner).select_current(&mut vtx);
        match selected {
            Err(_) => {
                warn!("vtx scan aborted: receiver refused a tune");
                return;
            }
            Ok(None) => break,
            Ok(Some(_)) => {
                // Let the receiver and the RSSI filter settle, then take the
                // pair the control loop last published.
                thread::sleep(Duration::from_millis(u64::from(settle_ms)));
                let (left, right) = {
                    let snapshot = lock(&status);
                    (snapshot.rssi_a, snapshot.rssi_b)
                };
                lock(&scanner).record(left + right);
            }
        }
    }
    match lock(&scanner).finalize(&mut vtx) {
        Ok(Some(best)) => info!(
            "vtx scan complete: best {}{} at {}",
            best.band.letter(),
            best.channel,
            best.rssi
        ),
        Ok(None) => warn!("vtx scan complete with an empty grid"),
        Err(_) => warn!("vtx scan best-cell tune failed"),
    }
}

/// The running tracker application: control loop thread plus the handles
/// collaborators use to reach it.
#[derive(Debug)]
pub struct Application<X> {
    handle: ControlHandle<X>,
    control: Option<JoinHandle<()>>,
}

impl<X> Application<X>
where
    X: ChannelSelector + Send + 'static,
{
    /// Starts the hardware and spawns the control loop.
    ///
    /// `vtx` must be the same shared receiver the core was built with, so
    /// foreground tuning and the scan worker arbitrate over one mutex.
    /// Startup failures ([`TrackerError::HwUnavailable`]) are returned
    /// before any thread spawns.
    pub fn launch<P, I2C, D, C>(
        mut core: TrackerCore<P, I2C, SharedVtx<X>, D, C>,
        vtx: SharedVtx<X>,
    ) -> Result<Self, TrackerError>
    where
        P: Read<u8> + Write<u8> + Send + 'static,
        I2C: I2c + Send + 'static,
        D: DelayNs + Send + 'static,
        C: Clock + Send + 'static,
    {
        core.start()?;
        let handle = ControlHandle {
            mailbox: Arc::new(CommandMailbox::new()),
            status: Arc::new(Mutex::new(core.status())),
            scan_results: Arc::new(Mutex::new(None)),
            scanner: Arc::new(Mutex::new(VtxScanner::new())),
            vtx,
            running: Arc::new(AtomicBool::new(true)),
        };
        let loop_handle = handle.clone();
        let control = thread::Builder::new()
            .name("tracker-control".into())
            .spawn(move || control_loop(core, loop_handle))
            .map_err(|_| TrackerError::HwUnavailable("control thread spawn failed"))?;
        Ok(Self {
            handle,
            control: Some(control),
        })
    }

    /// A new front-door handle.
    pub fn handle(&self) -> ControlHandle<X> {
        self.handle.clone()
    }

    /// Stops the control loop and waits for it to exit.
    pub fn stop(mut self) {
        self.handle.shutdown();
        if let Some(control) = self.control.take() {
            let _ = control.join();
        }
    }
}

impl<X> Drop for Application<X> {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(control) = self.control.take() {
            let _ = control.join();
        }
    }
}

fn control_loop<P, I2C, X, D, C>(
    mut core: TrackerCore<P, I2C, SharedVtx<X>, D, C>,
    handle: ControlHandle<X>,
) where
    P: Read<u8> + Write<u8>,
    I2C: I2c,
    X: ChannelSelector,
    D: DelayNs,
    C: Clock,
{
    let tick = Duration::from_millis(u64::from(core.config().timing.tick_ms));
    while handle.running.load(Ordering::Relaxed) {
        if let Some(command) = handle.mailbox.take() {
            if let Err(error) = core.handle_command(command) {
                warn!("command rejected: {}", error);
            }
        }
        let faulted = match core.tick() {
            Ok(()) => false,
            Err(error) => {
                warn!("tick fault: {}; dropping to manual", error);
                let _ = core.handle_command(Command::Manual);
                true
            }
        };

        let mut status = core.status();
        status.vtx_scan = lock(&handle.scanner).snapshot();
        *lock(&handle.status) = status;
        *lock(&handle.scan_results) = core.scan_results().cloned();

        if faulted {
            thread::sleep(Duration::from_secs(1));
        } else {
            thread::sleep(tick);
        }
    }
    info!("control loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::sim::{SimAdc, SimSelector, SimServoBus, TestClock, TestDelay};
    use crate::tracker::Mode;

    fn fast_config() -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.rssi_filter_len = 1;
        config.timing.tick_ms = 1;
        config
    }

    fn launch_app() -> (Application<SimSelector>, SimServoBus, SimAdc) {
        let servo = SimServoBus::new();
        let adc = SimAdc::new();
        let vtx = SharedVtx::new(SimSelector::new());
        let clock = TestClock::new(0);
        let delay = TestDelay::new(&clock);
        let core = TrackerCore::new(
            fast_config(),
            servo.clone(),
            adc.clone(),
            vtx.clone(),
            delay,
            clock,
        )
        .unwrap();
        let app = Application::launch(core, vtx).unwrap();
        (app, servo, adc)
    }

    fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(deadline_ms) {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn boot_sweep_runs_and_hands_over_to_auto() {
        let (app, _servo, _adc) = launch_app();
        let handle = app.handle();
        assert!(wait_until(2_000, || {
            handle.status().mode == Mode::Auto
        }));
        let results = handle.scan_results().unwrap();
        assert!(results.scan_complete);
        // Equal (zero) RSSI everywhere: the first station wins.
        assert_eq!(results.best_position, 1100);
        app.stop();
    }

    #[test]
    fn commands_flow_through_the_mailbox() {
        let (app, _servo, _adc) = launch_app();
        let handle = app.handle();
        assert!(wait_until(2_000, || handle.status().mode == Mode::Auto));

        assert!(handle.send(Command::Manual));
        assert!(wait_until(1_000, || handle.status().mode == Mode::Manual));

        assert!(handle.send(Command::Home));
        assert!(wait_until(1_000, || handle.status().angle == 2047));
        app.stop();
    }

    #[test]
    fn invalid_commands_are_refused_at_the_door() {
        let (app, _servo, _adc) = launch_app();
        let handle = app.handle();
        assert!(!handle.send(Command::VtxSet {
            band: Band::A,
            channel: 0
        }));
        app.stop();
    }

    #[test]
    fn vtx_scan_start_is_start_once() {
        let (app, _servo, _adc) = launch_app();
        let handle = app.handle();
        assert!(wait_until(2_000, || handle.status().mode == Mode::Auto));

        assert!(handle.send(Command::VtxScanStart { settle_ms: None }));
        // Re-entry is refused while the worker is still walking the grid.
        assert!(!handle.send(Command::VtxScanStart { settle_ms: None }));
        assert!(handle.status().vtx_scan.in_progress);
        app.stop();
    }
}
