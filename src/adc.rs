//! ADS1115 single-shot sampling over I²C.
//!
//! The two antenna log-detectors feed single-ended inputs of a 16-bit
//! ADS1115. Each read triggers one conversion on the requested channel at
//! the configured full-scale range, polls the ready flag, and returns the
//! raw signed counts (0..32767 for a single-ended input, with small
//! negative excursions possible around ground).
//!
//! Reads are blocking and bounded: at the fixed 128 SPS data rate a
//! conversion completes in under 8 ms, and the ready poll gives up shortly
//! after that instead of spinning forever on a wedged bus.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use thiserror::Error;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

const CONFIG_OS_SINGLE: u16 = 0x8000;
const CONFIG_MODE_SINGLE: u16 = 0x0100;
const CONFIG_DR_128SPS: u16 = 0x0080;
const CONFIG_COMP_DISABLE: u16 = 0x0003;

const READY_POLL_INTERVAL_US: u32 = 250;
const READY_POLL_LIMIT: u32 = 40;

/// Programmable full-scale range of the ADS1115 input amplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Gain {
    /// ±6.144 V full scale.
    Fsr6V144,
    /// ±4.096 V full scale.
    Fsr4V096,
    /// ±2.048 V full scale. Matches the log-detector output swing.
    #[default]
    Fsr2V048,
    /// ±1.024 V full scale.
    Fsr1V024,
    /// ±0.512 V full scale.
    Fsr0V512,
    /// ±0.256 V full scale.
    Fsr0V256,
}

impl Gain {
    fn config_bits(self) -> u16 {
        let pga: u16 = match self {
            Gain::Fsr6V144 => 0b000,
            Gain::Fsr4V096 => 0b001,
            Gain::Fsr2V048 => 0b010,
            Gain::Fsr1V024 => 0b011,
            Gain::Fsr0V512 => 0b100,
            Gain::Fsr0V256 => 0b101,
        };
        pga << 9
    }
}

/// Errors produced by [`Ads1115`] reads.
#[derive(Debug, Error)]
pub enum AdcError<E> {
    /// The underlying I²C transfer failed.
    #[error("i2c transfer failed")]
    I2c(E),
    /// The conversion-ready flag never came up before the poll limit.
    #[error("conversion not ready within deadline")]
    NotReady,
    /// Channel index outside `0..=3`.
    #[error("invalid adc channel {0}")]
    InvalidChannel(u8),
}

/// Single-shot ADS1115 sampler.
#[derive(Debug)]
pub struct Ads1115<I2C> {
    i2c: I2C,
    address: u8,
    gain: Gain,
}

impl<I2C, E> Ads1115<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Creates a sampler on `address` with the given full-scale gain.
    pub fn new(i2c: I2C, address: u8, gain: Gain) -> Self {
        Self { i2c, address, gain }
    }

    /// Triggers one conversion on single-ended `channel` (0..=3) and
    /// returns the raw counts.
    pub fn read(&mut self, channel: u8, delay: &mut impl DelayNs) -> Result<i16, AdcError<E>> {
        if channel > 3 {
            return Err(AdcError::InvalidChannel(channel));
        }
        let mux = (0b100 | u16::from(channel)) << 12;
        let config = CONFIG_OS_SINGLE
            | mux
            | self.gain.config_bits()
            | CONFIG_MODE_SINGLE
            | CONFIG_DR_128SPS
            | CONFIG_COMP_DISABLE;
        let [hi, lo] = config.to_be_bytes();
        self.i2c
            .write(self.address, &[REG_CONFIG, hi, lo])
            .map_err(AdcError::I2c)?;

        self.wait_ready(delay)?;

        let mut raw = [0u8; 2];
        self.i2c
            .write_read(self.address, &[REG_CONVERSION], &mut raw)
            .map_err(AdcError::I2c)?;
        Ok(i16::from_be_bytes(raw))
    }

    fn wait_ready(&mut self, delay: &mut impl DelayNs) -> Result<(), AdcError<E>> {
        for _ in 0..READY_POLL_LIMIT {
            delay.delay_us(READY_POLL_INTERVAL_US);
            let mut config = [0u8; 2];
            self.i2c
                .write_read(self.address, &[REG_CONFIG], &mut config)
                .map_err(AdcError::I2c)?;
            // OS reads back 1 once the converter is idle again.
            if config[0] & 0x80 != 0 {
                return Ok(());
            }
        }
        Err(AdcError::NotReady)
    }
}
