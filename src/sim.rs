//! Hand-rolled hardware simulators for the test suites.
//!
//! `embedded-hal-mock` covers the transaction-scripted unit tests; the
//! state-machine tests need devices that *behave* instead (a servo that
//! answers whatever the driver asks, an ADC with scriptable per-channel
//! sample streams, a controllable clock). These are shared by the module
//! test suites and the end-to-end scenarios in `lib.rs`.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::i2c::{self, ErrorKind as I2cErrorKind, I2c, Operation};
use embedded_hal_nb::serial::{self, ErrorKind as SerialErrorKind, Read, Write};

use crate::clock::Clock;
use crate::vtx::{Band, ChannelSelector, VideoMode, VtxError};

// ---------------------------------------------------------------------------
// Time

/// Shared, manually driven millisecond clock.
///
/// With a non-zero `step`, every `now_ms()` query advances time by `step`,
/// which lets deadline loops terminate without real sleeping.
#[derive(Clone, Debug)]
pub struct TestClock {
    now: Arc<AtomicU64>,
    step: u64,
}

impl TestClock {
    pub fn new(start_ms: u64) -> Self {
        Self::with_step(start_ms, 0)
    }

    pub fn with_step(start_ms: u64, step_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
            step: step_ms,
        }
    }

    pub fn advance(&self, ms: u64) {
        let _ = self.now.fetch_add(ms, Ordering::Relaxed);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}

/// Delay provider that advances a [`TestClock`] instead of sleeping.
#[derive(Clone, Debug)]
pub struct TestDelay {
    clock: TestClock,
}

impl TestDelay {
    pub fn new(clock: &TestClock) -> Self {
        Self {
            clock: clock.clone(),
        }
    }
}

impl DelayNs for TestDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(u64::from(ns) / 1_000_000);
    }
}

// ---------------------------------------------------------------------------
// Serial

/// Serial port that never produces a byte and swallows writes.
#[derive(Debug, Default)]
pub struct EmptyPort;

impl serial::ErrorType for EmptyPort {
    type Error = SerialErrorKind;
}

impl Read<u8> for EmptyPort {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        Err(nb::Error::WouldBlock)
    }
}

impl Write<u8> for EmptyPort {
    fn write(&mut self, _word: u8) -> nb::Result<(), Self::Error> {
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

/// Register file and behavior of the simulated SMS/STS servo.
#[derive(Debug)]
pub struct ServoSimState {
    /// Raw register file; present-position lives at 56/57.
    pub regs: [u8; 80],
    /// Every accepted position write as `(target, speed, accel)`.
    pub position_writes: Vec<(u16, u16, u8)>,
    /// Error status byte echoed in every reply.
    pub error_status: u8,
    /// Drop replies entirely (driver sees `NoReply`).
    pub mute: bool,
    rx: VecDeque<u8>,
    frame: Vec<u8>,
}

impl ServoSimState {
    fn new() -> Self {
        let mut regs = [0u8; 80];
        regs[3] = 0x09; // model 777
        regs[4] = 0x03;
        regs[56] = 0xFF; // present position 2047
        regs[57] = 0x07;
        regs[62] = 121; // 12.1 V
        regs[63] = 35; // 35 °C
        regs[69] = 0x64; // 100 counts of current
        Self {
            regs,
            position_writes: Vec::new(),
            error_status: 0,
            mute: false,
            rx: VecDeque::new(),
            frame: Vec::new(),
        }
    }

    /// Present position as the driver would read it.
    pub fn position(&self) -> u16 {
        u16::from_le_bytes([self.regs[56], self.regs[57]])
    }

    /// Overrides the present position.
    pub fn set_position(&mut self, position: u16) {
        let [lo, hi] = position.to_le_bytes();
        self.regs[56] = lo;
        self.regs[57] = hi;
    }

    fn push_reply(&mut self, id: u8, params: &[u8]) {
        let error = self.error_status;
        let len = params.len() as u8 + 2;
        let mut sum = id.wrapping_add(len).wrapping_add(error);
        self.rx.extend([0xFF, 0xFF, id, len, error]);
        for &p in params {
            sum = sum.wrapping_add(p);
            self.rx.push_back(p);
        }
        self.rx.push_back(!sum);
    }

    fn process_frame(&mut self) {
        let frame = std::mem::take(&mut self.frame);
        if self.mute {
            return;
        }
        let id = frame[2];
        let instruction = frame[4];
        let params = &frame[5..frame.len() - 1];
        match instruction {
            // PING
            0x01 => self.push_reply(id, &[]),
            // READ addr len
            0x02 => {
                let start = params[0] as usize;
                let count = params[1] as usize;
                let data: Vec<u8> = self.regs[start..start + count].to_vec();
                self.push_reply(id, &data);
            }
            // WRITE addr data…
            0x03 => {
                let start = params[0] as usize;
                let data = params[1..].to_vec();
                self.regs[start..start + data.len()].copy_from_slice(&data);
                // The accel/goal block: the sim servo reaches its goal
                // instantly, so the present position follows it.
                if start == 41 && data.len() == 7 {
                    let target = u16::from_le_bytes([data[1], data[2]]);
                    let speed = u16::from_le_bytes([data[5], data[6]]);
                    self.position_writes.push((target, speed, data[0]));
                    self.set_position(target);
                }
                self.push_reply(id, &[]);
            }
            _ => {}
        }
    }
}

/// Cloneable handle onto a simulated servo bus.
#[derive(Clone, Debug)]
pub struct SimServoBus(Arc<Mutex<ServoSimState>>);

impl SimServoBus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ServoSimState::new())))
    }

    pub fn state(&self) -> MutexGuard<'_, ServoSimState> {
        self.0.lock().unwrap()
    }
}

impl serial::ErrorType for SimServoBus {
    type Error = SerialErrorKind;
}

impl Write<u8> for SimServoBus {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        let mut state = self.0.lock().unwrap();
        state.frame.push(word);
        if state.frame.len() >= 4 {
            let expected = 4 + state.frame[3] as usize;
            if state.frame.len() == expected {
                state.process_frame();
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

impl Read<u8> for SimServoBus {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        let mut state = self.0.lock().unwrap();
        state.rx.pop_front().ok_or(nb::Error::WouldBlock)
    }
}

// ---------------------------------------------------------------------------
// I²C ADC

/// Behavior of the simulated ADS1115.
#[derive(Debug)]
pub struct AdcSimState {
    /// Scripted samples per single-ended channel, consumed in order.
    pub scripts: [VecDeque<i16>; 4],
    /// Sample returned when a channel's script runs dry.
    pub fallback: [i16; 4],
    /// Fail every transfer (driver sees an I²C error).
    pub fail: bool,
    selected: usize,
    reg: u8,
}

/// Cloneable handle onto a simulated ADS1115.
#[derive(Clone, Debug)]
pub struct SimAdc(Arc<Mutex<AdcSimState>>);

impl SimAdc {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(AdcSimState {
            scripts: Default::default(),
            fallback: [0; 4],
            fail: false,
            selected: 0,
            reg: 0,
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, AdcSimState> {
        self.0.lock().unwrap()
    }

    /// Queues raw samples on one channel.
    pub fn push_samples(&self, channel: u8, samples: &[i16]) {
        let mut state = self.state();
        state.scripts[channel as usize].extend(samples);
    }

    /// Sets the steady-state sample for one channel.
    pub fn set_fallback(&self, channel: u8, value: i16) {
        self.state().fallback[channel as usize] = value;
    }
}

impl i2c::ErrorType for SimAdc {
    type Error = I2cErrorKind;
}

impl I2c for SimAdc {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(I2cErrorKind::Other);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    if bytes.len() == 3 && bytes[0] == 0x01 {
                        // Config write: decode the single-ended mux channel.
                        state.selected = usize::from(bytes[1] >> 4 & 0b011);
                        state.reg = 0x01;
                    } else if bytes.len() == 1 {
                        state.reg = bytes[0];
                    }
                }
                Operation::Read(buf) => match state.reg {
                    // Config readback: conversion always complete.
                    0x01 => {
                        buf[0] = 0x80;
                        buf[1] = 0x00;
                    }
                    _ => {
                        let channel = state.selected;
                        let sample = state.scripts[channel]
                            .pop_front()
                            .unwrap_or(state.fallback[channel]);
                        buf.copy_from_slice(&sample.to_be_bytes());
                    }
                },
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// VTX

/// Call log of the simulated channel selector.
#[derive(Debug, Default)]
pub struct SelectorState {
    /// Every accepted `select` call in order.
    pub calls: Vec<(Band, u8)>,
    /// Every accepted video-mode switch in order.
    pub modes: Vec<VideoMode>,
    /// Fail all operations (driver sees a GPIO error).
    pub fail: bool,
    current: Option<(Band, u8)>,
}

/// Cloneable [`ChannelSelector`] that records instead of bit-banging.
#[derive(Clone, Debug, Default)]
pub struct SimSelector(Arc<Mutex<SelectorState>>);

impl SimSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, SelectorState> {
        self.0.lock().unwrap()
    }
}

impl ChannelSelector for SimSelector {
    fn select(&mut self, band: Band, channel: u8) -> Result<(), VtxError> {
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(VtxError::Gpio);
        }
        state.calls.push((band, channel));
        state.current = Some((band, channel));
        Ok(())
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> Result<(), VtxError> {
        let mut state = self.0.lock().unwrap();
        if state.fail {
            return Err(VtxError::Gpio);
        }
        state.modes.push(mode);
        Ok(())
    }

    fn selected(&self) -> Option<(Band, u8)> {
        self.0.lock().unwrap().current
    }
}

// ---------------------------------------------------------------------------
// GPIO recording for the bit-bang driver

/// Which VTX bus line a recorded event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Clk,
    Data,
    Cs,
}

/// Shared event log and scripted input levels for [`RecordPin`]s.
#[derive(Clone, Debug, Default)]
pub struct PinLog {
    events: Rc<RefCell<Vec<(Line, bool)>>>,
    reads: Rc<RefCell<VecDeque<bool>>>,
}

impl PinLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Scripts the levels an input read will observe, in order.
    pub fn script_reads(&self, bits: &[bool]) {
        self.reads.borrow_mut().extend(bits.iter().copied());
    }
}

/// GPIO that appends every level change to a shared [`PinLog`].
#[derive(Debug)]
pub struct RecordPin {
    line: Line,
    log: PinLog,
}

impl RecordPin {
    pub fn new(line: Line, log: &PinLog) -> Self {
        Self {
            line,
            log: log.clone(),
        }
    }
}

impl digital::ErrorType for RecordPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for RecordPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.log.events.borrow_mut().push((self.line, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.log.events.borrow_mut().push((self.line, true));
        Ok(())
    }
}

impl InputPin for RecordPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.log.reads.borrow_mut().pop_front().unwrap_or(false))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|level| !level)
    }
}

/// Reconstructs the words clocked out while CS was low.
///
/// Returns `(word, bit_count)` per CS-low window, sampling DATA on each
/// rising CLK edge, LSB first — an independent decode of the wire protocol.
pub fn decode_words(log: &PinLog) -> Vec<(u32, usize)> {
    let mut clk = false;
    let mut dat = false;
    let mut cs = true;
    let mut word = 0u32;
    let mut bits = 0usize;
    let mut words = Vec::new();
    for &(line, level) in log.events.borrow().iter() {
        match line {
            Line::Cs => {
                if cs && !level {
                    word = 0;
                    bits = 0;
                } else if !cs && level {
                    words.push((word, bits));
                }
                cs = level;
            }
            Line::Clk => {
                if !clk && level && !cs {
                    if dat {
                        word |= 1 << bits;
                    }
                    bits += 1;
                }
                clk = level;
            }
            Line::Data => dat = level,
        }
    }
    words
}
