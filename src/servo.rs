//! SMS/STS smart-servo protocol over a half-duplex serial bus.
//!
//! The pan axis is an ST3215-class serial bus servo at 115200 bps. Every
//! operation is a synchronous request/response exchange:
//!
//! ```text
//! [0xFF 0xFF id len instruction params… checksum]
//! [0xFF 0xFF id len error params… checksum]        (reply)
//! ```
//!
//! where `len` counts the instruction/error byte, the parameters and the
//! checksum, and the checksum is the complement of the byte sum after the
//! header. Values wider than a byte are little-endian; speed and current
//! are 16-bit sign-magnitude with bit 15 as the sign.
//!
//! The driver is deliberately thin: it does not retry, does not enforce
//! soft limits (callers clamp targets), and bounds every exchange with a
//! reply deadline so a dead bus cannot stall the control loop.

use embedded_hal::delay::DelayNs;
use embedded_hal_nb::serial::{Read, Write};
use thiserror::Error;

use crate::clock::Clock;

const INST_PING: u8 = 0x01;
const INST_READ: u8 = 0x02;
const INST_WRITE: u8 = 0x03;

const REG_MODEL_L: u8 = 3;
const REG_OPERATING_MODE: u8 = 33;
const REG_TORQUE_ENABLE: u8 = 40;
const REG_ACCEL: u8 = 41;
const REG_PRESENT_POSITION_L: u8 = 56;
const REG_MOVING: u8 = 66;

/// Span of the composite status read: registers 56..=70 (position, speed,
/// load, voltage, temperature, flags, moving, current).
const STATUS_BLOCK_LEN: usize = 15;

/// Position-mode value of the operating-mode register.
const MODE_POSITION: u8 = 0;

/// Milliamps per current-register count on the ST3215.
const CURRENT_MA_NUM: i32 = 13;
const CURRENT_MA_DEN: i32 = 2;

const IDLE_POLL_INTERVAL_MS: u32 = 10;

/// Servo bus failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum ServoError {
    /// The bus accepted part of an exchange and then went quiet.
    #[error("servo bus timed out mid-exchange")]
    BusTimeout,
    /// A reply arrived but its framing or checksum was wrong.
    #[error("corrupt servo reply frame")]
    Frame,
    /// The servo answered with a non-zero hardware error status.
    #[error("servo reported error status {0:#04x}")]
    Device(u8),
    /// Nothing answered before the reply deadline.
    #[error("no reply from servo id {0}")]
    NoReply(u8),
}

/// Composite health/motion readout, one bus exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct ServoStatus {
    /// Present position in servo units (0..=4095).
    pub position: u16,
    /// Present speed, sign-magnitude decoded.
    pub speed: i32,
    /// Supply voltage in tenths of a volt.
    pub voltage_dv: u8,
    /// Internal temperature in °C.
    pub temperature_c: u8,
    /// Winding current in milliamps, signed.
    pub current_ma: i32,
    /// Whether the servo considers itself in motion.
    pub moving: bool,
}

/// Driver for one half-duplex SMS/STS servo bus.
///
/// `P` is the serial port (non-blocking [`embedded_hal_nb::serial`] traits);
/// `C` supplies the reply deadline time base.
#[derive(Debug)]
pub struct ServoDriver<P, C> {
    port: P,
    clock: C,
    timeout_ms: u32,
}

impl<P, C> ServoDriver<P, C>
where
    P: Read<u8> + Write<u8>,
    C: Clock,
{
    /// Creates a driver with the given per-exchange reply deadline.
    pub fn new(port: P, clock: C, timeout_ms: u32) -> Self {
        Self {
            port,
            clock,
            timeout_ms,
        }
    }

    /// Verifies the device answers and returns its model number.
    pub fn ping(&mut self, id: u8) -> Result<u16, ServoError> {
        self.transact(id, INST_PING, &[], &mut [])?;
        let mut model = [0u8; 2];
        self.read_registers(id, REG_MODEL_L, &mut model)?;
        Ok(u16::from_le_bytes(model))
    }

    /// Puts the servo into position mode.
    pub fn set_mode_position(&mut self, id: u8) -> Result<(), ServoError> {
        self.write_registers(id, REG_OPERATING_MODE, &[MODE_POSITION])
    }

    /// Enables or disables holding torque.
    pub fn set_torque(&mut self, id: u8, on: bool) -> Result<(), ServoError> {
        self.write_registers(id, REG_TORQUE_ENABLE, &[u8::from(on)])
    }

    /// Reads the present encoder position.
    pub fn read_position(&mut self, id: u8) -> Result<u16, ServoError> {
        let mut raw = [0u8; 2];
        self.read_registers(id, REG_PRESENT_POSITION_L, &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    /// Reads position, speed, voltage, temperature, current and the moving
    /// flag in one exchange.
    pub fn read_status(&mut self, id: u8) -> Result<ServoStatus, ServoError> {
        let mut block = [0u8; STATUS_BLOCK_LEN];
        self.read_registers(id, REG_PRESENT_POSITION_L, &mut block)?;
        Ok(ServoStatus {
            position: u16::from_le_bytes([block[0], block[1]]),
            speed: sign_magnitude(u16::from_le_bytes([block[2], block[3]])),
            voltage_dv: block[6],
            temperature_c: block[7],
            current_ma: sign_magnitude(u16::from_le_bytes([block[13], block[14]])) * CURRENT_MA_NUM
                / CURRENT_MA_DEN,
            moving: block[10] != 0,
        })
    }

    /// Enqueues a move to `target` units with the given speed and
    /// acceleration. Targets are not range-checked here; callers clamp.
    pub fn write_position(
        &mut self,
        id: u8,
        target: u16,
        speed: u16,
        accel: u8,
    ) -> Result<(), ServoError> {
        let [pos_l, pos_h] = target.to_le_bytes();
        let [spd_l, spd_h] = speed.to_le_bytes();
        // Acceleration, goal position, goal time (unused), goal speed form
        // one contiguous register block starting at REG_ACCEL.
        self.write_registers(id, REG_ACCEL, &[accel, pos_l, pos_h, 0, 0, spd_l, spd_h])
    }

    /// Polls the moving flag until it clears or `timeout_ms` elapses.
    /// Returns whether the servo came to rest.
    pub fn wait_idle(
        &mut self,
        id: u8,
        timeout_ms: u32,
        delay: &mut impl DelayNs,
    ) -> Result<bool, ServoError> {
        let deadline = self.clock.now_ms() + u64::from(timeout_ms);
        loop {
            let mut moving = [0u8; 1];
            self.read_registers(id, REG_MOVING, &mut moving)?;
            if moving[0] == 0 {
                return Ok(true);
            }
            if self.clock.now_ms() >= deadline {
                return Ok(false);
            }
            delay.delay_ms(IDLE_POLL_INTERVAL_MS);
        }
    }

    fn read_registers(&mut self, id: u8, start: u8, out: &mut [u8]) -> Result<(), ServoError> {
        self.transact(id, INST_READ, &[start, out.len() as u8], out)
    }

    fn write_registers(&mut self, id: u8, start: u8, data: &[u8]) -> Result<(), ServoError> {
        let mut params = [0u8; 9];
        params[0] = start;
        params[1..=data.len()].copy_from_slice(data);
        self.transact(id, INST_WRITE, &params[..=data.len()], &mut [])
    }

    /// One request/response exchange: sends the instruction frame and
    /// parses the reply into `reply_params`.
    fn transact(
        &mut self,
        id: u8,
        instruction: u8,
        params: &[u8],
        reply_params: &mut [u8],
    ) -> Result<(), ServoError> {
        self.send_frame(id, instruction, params)?;
        self.read_reply(id, reply_params)
    }

    fn send_frame(&mut self, id: u8, instruction: u8, params: &[u8]) -> Result<(), ServoError> {
        let len = params.len() as u8 + 2;
        let mut sum = id.wrapping_add(len).wrapping_add(instruction);
        self.write_byte(0xFF)?;
        self.write_byte(0xFF)?;
        self.write_byte(id)?;
        self.write_byte(len)?;
        self.write_byte(instruction)?;
        for &p in params {
            sum = sum.wrapping_add(p);
            self.write_byte(p)?;
        }
        self.write_byte(!sum)?;
        self.flush()
    }

    fn read_reply(&mut self, id: u8, params: &mut [u8]) -> Result<(), ServoError> {
        // Resynchronize on the 0xFF 0xFF header, tolerating line noise.
        let mut prev = self.read_byte(ServoError::NoReply(id))?;
        loop {
            let cur = self.read_byte(ServoError::NoReply(id))?;
            if prev == 0xFF && cur == 0xFF {
                break;
            }
            prev = cur;
        }

        let rid = self.read_byte(ServoError::BusTimeout)?;
        if rid != id {
            return Err(ServoError::Frame);
        }
        let len = self.read_byte(ServoError::BusTimeout)?;
        if len as usize != params.len() + 2 {
            return Err(ServoError::Frame);
        }
        let error = self.read_byte(ServoError::BusTimeout)?;
        let mut sum = rid.wrapping_add(len).wrapping_add(error);
        for slot in params.iter_mut() {
            let byte = self.read_byte(ServoError::BusTimeout)?;
            sum = sum.wrapping_add(byte);
            *slot = byte;
        }
        let checksum = self.read_byte(ServoError::BusTimeout)?;
        if checksum != !sum {
            return Err(ServoError::Frame);
        }
        if error != 0 {
            return Err(ServoError::Device(error));
        }
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), ServoError> {
        let deadline = self.clock.now_ms() + u64::from(self.timeout_ms);
        loop {
            match self.port.write(byte) {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {
                    if self.clock.now_ms() >= deadline {
                        return Err(ServoError::BusTimeout);
                    }
                }
                Err(nb::Error::Other(_)) => return Err(ServoError::Frame),
            }
        }
    }

    fn flush(&mut self) -> Result<(), ServoError> {
        let deadline = self.clock.now_ms() + u64::from(self.timeout_ms);
        loop {
            match self.port.flush() {
                Ok(()) => return Ok(()),
                Err(nb::Error::WouldBlock) => {
                    if self.clock.now_ms() >= deadline {
                        return Err(ServoError::BusTimeout);
                    }
                }
                Err(nb::Error::Other(_)) => return Err(ServoError::Frame),
            }
        }
    }

    fn read_byte(&mut self, timeout_error: ServoError) -> Result<u8, ServoError> {
        let deadline = self.clock.now_ms() + u64::from(self.timeout_ms);
        loop {
            match self.port.read() {
                Ok(byte) => return Ok(byte),
                Err(nb::Error::WouldBlock) => {
                    if self.clock.now_ms() >= deadline {
                        return Err(timeout_error);
                    }
                }
                Err(nb::Error::Other(_)) => return Err(ServoError::Frame),
            }
        }
    }
}

/// Decodes a 16-bit sign-magnitude value using bit 15 as the sign bit.
fn sign_magnitude(raw: u16) -> i32 {
    if raw & 0x8000 != 0 {
        -i32::from(raw & 0x7FFF)
    } else {
        i32::from(raw)
    }
}
