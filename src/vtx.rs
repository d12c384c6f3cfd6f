//! RX5808-class receiver control over bit-banged 3-wire SPI.
//!
//! The receiver's RTC6705 synthesizer takes 25-bit frames on CLK/DATA/CS,
//! LSB first, at up to 10 kHz:
//!
//! ```text
//! [20 bits payload][RW][4-bit register address]   (LSB first on the wire)
//! ```
//!
//! Selecting a channel writes register A with a fixed sync payload, waits
//! at least 500 µs, then writes the synthesizer word for the target
//! frequency to register B. Register B can optionally be read back to
//! verify the change took.
//!
//! Idle line state is CS high, CLK low, DATA low. Each bit holds DATA for a
//! quarter period, pulses CLK high for a quarter and low for a quarter.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use thiserror::Error;

const SYNTH_REG_A: u8 = 0x0;
const SYNTH_REG_B: u8 = 0x1;
const WRITE_BIT: u32 = 1;
const PACKET_BITS: u32 = 25;

/// Fixed payload written to register A before a register B update.
const REG_A_SYNC: u32 = 0x8;

/// Quarter of the 100 µs bit period at the 10 kHz bit-bang rate.
const QUARTER_US: u32 = 25;

/// Hold time between the register A sync write and the register B write.
const REG_GAP_US: u32 = 500;

/// 5.8 GHz band plan: rows A, B, E, F, R, L; columns channel 1..=8, MHz.
pub const FREQUENCY_TABLE_MHZ: [[u16; 8]; 6] = [
    [5865, 5845, 5825, 5805, 5785, 5765, 5745, 5725],
    [5733, 5752, 5771, 5790, 5809, 5828, 5847, 5866],
    [5705, 5685, 5665, 5645, 5885, 5905, 5925, 5945],
    [5740, 5760, 5780, 5800, 5820, 5840, 5860, 5880],
    [5658, 5695, 5732, 5769, 5806, 5843, 5880, 5917],
    [5362, 5399, 5436, 5473, 5510, 5547, 5584, 5621],
];

/// The six selectable bands of the 5.8 GHz FPV convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Band {
    /// Boscam A.
    A,
    /// Boscam B.
    B,
    /// Boscam E / DJI.
    E,
    /// Fatshark / ImmersionRC.
    F,
    /// Raceband.
    R,
    /// Lowband.
    L,
}

impl Band {
    /// All bands in scan order.
    pub const ALL: [Band; 6] = [Band::A, Band::B, Band::E, Band::F, Band::R, Band::L];

    /// Row index into [`FREQUENCY_TABLE_MHZ`].
    pub fn index(self) -> usize {
        match self {
            Band::A => 0,
            Band::B => 1,
            Band::E => 2,
            Band::F => 3,
            Band::R => 4,
            Band::L => 5,
        }
    }

    /// The band letter as used by collaborators and logs.
    pub fn letter(self) -> char {
        match self {
            Band::A => 'A',
            Band::B => 'B',
            Band::E => 'E',
            Band::F => 'F',
            Band::R => 'R',
            Band::L => 'L',
        }
    }
}

/// Receiver video source mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VideoMode {
    /// Picture-in-picture mix of both receivers.
    Mix,
    /// Automatic diversity switching.
    Diversity,
}

/// VTX control failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum VtxError {
    /// A GPIO write or read failed.
    #[error("vtx gpio access failed")]
    Gpio,
    /// Channel number outside `1..=8`.
    #[error("invalid vtx channel {0}")]
    InvalidChannel(u8),
}

/// Carrier frequency in MHz for a band/channel pair.
///
/// Returns `None` for channels outside `1..=8`.
pub fn frequency_mhz(band: Band, channel: u8) -> Option<u16> {
    if !(1..=8).contains(&channel) {
        return None;
    }
    Some(FREQUENCY_TABLE_MHZ[band.index()][usize::from(channel - 1)])
}

/// Synthesizer register B word for a carrier frequency in MHz.
///
/// `((f - 479) / 2 / 32) << 7 | ((f - 479) / 2) % 32`, integer arithmetic.
pub fn synthesizer_word(freq_mhz: u16) -> u32 {
    let n = (u32::from(freq_mhz) - 479) / 2;
    ((n / 32) << 7) | (n % 32)
}

/// Channel selection seam between the tracker core, the scan worker and
/// the concrete receiver driver.
pub trait ChannelSelector {
    /// Tunes the receiver to `band`/`channel` (1..=8).
    fn select(&mut self, band: Band, channel: u8) -> Result<(), VtxError>;

    /// Switches the receiver video mode.
    fn set_video_mode(&mut self, mode: VideoMode) -> Result<(), VtxError>;

    /// The last successfully selected band/channel, if any.
    fn selected(&self) -> Option<(Band, u8)>;
}

/// Bit-banged RX5808/RTC6705 driver.
#[derive(Debug)]
pub struct Rx5808<CLK, DAT, CS, D> {
    clk: CLK,
    dat: DAT,
    cs: CS,
    delay: D,
    current: Option<(Band, u8)>,
}

impl<CLK, DAT, CS, D> Rx5808<CLK, DAT, CS, D>
where
    CLK: OutputPin,
    DAT: OutputPin,
    CS: OutputPin,
    D: DelayNs,
{
    /// Takes the three bus lines and drives them to the idle state.
    pub fn new(clk: CLK, dat: DAT, cs: CS, delay: D) -> Result<Self, VtxError> {
        let mut vtx = Self {
            clk,
            dat,
            cs,
            delay,
            current: None,
        };
        vtx.idle_lines()?;
        Ok(vtx)
    }

    fn idle_lines(&mut self) -> Result<(), VtxError> {
        self.cs.set_high().map_err(|_| VtxError::Gpio)?;
        self.clk.set_low().map_err(|_| VtxError::Gpio)?;
        self.dat.set_low().map_err(|_| VtxError::Gpio)
    }

    /// Tunes to `band`/`channel`: register A sync write, ≥500 µs gap,
    /// register B synthesizer word.
    pub fn set_channel(&mut self, band: Band, channel: u8) -> Result<(), VtxError> {
        let freq = frequency_mhz(band, channel).ok_or(VtxError::InvalidChannel(channel))?;
        self.write_register(SYNTH_REG_A, REG_A_SYNC)?;
        self.delay.delay_us(REG_GAP_US);
        self.write_register(SYNTH_REG_B, synthesizer_word(freq))?;
        self.current = Some((band, channel));
        Ok(())
    }

    /// Switches between Mix and Diversity, then re-applies the current
    /// channel to settle the receiver.
    ///
    /// Mix requires a sideband clock gesture first: CS high, CLK held high
    /// for 100 ms then low for 500 ms.
    pub fn set_mode(&mut self, mode: VideoMode) -> Result<(), VtxError> {
        if mode == VideoMode::Mix {
            self.cs.set_high().map_err(|_| VtxError::Gpio)?;
            self.clk.set_high().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_ms(100);
            self.clk.set_low().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_ms(500);
        }
        self.write_register(SYNTH_REG_A, REG_A_SYNC)?;
        self.delay.delay_us(REG_GAP_US);
        self.write_register(SYNTH_REG_A, REG_A_SYNC)?;
        if let Some((band, channel)) = self.current {
            self.set_channel(band, channel)?;
        }
        Ok(())
    }

    fn write_register(&mut self, register: u8, payload: u32) -> Result<(), VtxError> {
        let word = ((payload & 0xF_FFFF) << 5) | (WRITE_BIT << 4) | u32::from(register & 0xF);
        self.send_word(word)
    }

    fn send_word(&mut self, word: u32) -> Result<(), VtxError> {
        self.cs.set_low().map_err(|_| VtxError::Gpio)?;
        self.delay.delay_us(QUARTER_US);
        for bit in 0..PACKET_BITS {
            if word >> bit & 1 != 0 {
                self.dat.set_high().map_err(|_| VtxError::Gpio)?;
            } else {
                self.dat.set_low().map_err(|_| VtxError::Gpio)?;
            }
            self.delay.delay_us(QUARTER_US);
            self.clk.set_high().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(QUARTER_US);
            self.clk.set_low().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(QUARTER_US);
        }
        self.delay.delay_us(QUARTER_US);
        self.cs.set_high().map_err(|_| VtxError::Gpio)?;
        self.dat.set_low().map_err(|_| VtxError::Gpio)
    }
}

impl<CLK, DAT, CS, D> Rx5808<CLK, DAT, CS, D>
where
    CLK: OutputPin,
    DAT: OutputPin + InputPin,
    CS: OutputPin,
    D: DelayNs,
{
    /// Reads the 20 data bits of a synthesizer register.
    ///
    /// Sends the 5-bit address-plus-read header, then clocks the data in on
    /// the DATA line. Requires the DATA GPIO to be readable (open-drain or
    /// input-switchable pin).
    pub fn read_register(&mut self, register: u8) -> Result<u32, VtxError> {
        self.cs.set_low().map_err(|_| VtxError::Gpio)?;
        self.delay.delay_us(QUARTER_US);

        // Address phase: 4 address bits plus RW=0, LSB first.
        let header = u32::from(register & 0xF);
        for bit in 0..5 {
            if header >> bit & 1 != 0 {
                self.dat.set_high().map_err(|_| VtxError::Gpio)?;
            } else {
                self.dat.set_low().map_err(|_| VtxError::Gpio)?;
            }
            self.delay.delay_us(QUARTER_US);
            self.clk.set_high().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(QUARTER_US);
            self.clk.set_low().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(QUARTER_US);
        }

        let mut data = 0u32;
        for bit in 0..20 {
            self.clk.set_high().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(QUARTER_US);
            if self.dat.is_high().map_err(|_| VtxError::Gpio)? {
                data |= 1 << bit;
            }
            self.delay.delay_us(QUARTER_US);
            self.clk.set_low().map_err(|_| VtxError::Gpio)?;
            self.delay.delay_us(2 * QUARTER_US);
        }

        self.cs.set_high().map_err(|_| VtxError::Gpio)?;
        self.dat.set_low().map_err(|_| VtxError::Gpio)?;
        Ok(data)
    }

    /// Tunes and then verifies the change by reading register B back.
    ///
    /// If the synthesizer already holds the target word, the register
    /// writes are skipped entirely. Returns whether the receiver ended up
    /// on the requested frequency.
    pub fn set_channel_verified(&mut self, band: Band, channel: u8) -> Result<bool, VtxError> {
        let freq = frequency_mhz(band, channel).ok_or(VtxError::InvalidChannel(channel))?;
        let word = synthesizer_word(freq);
        if self.read_register(SYNTH_REG_B)? == word {
            self.current = Some((band, channel));
            return Ok(true);
        }
        self.set_channel(band, channel)?;
        let readback = self.read_register(SYNTH_REG_B)?;
        Ok(readback == word)
    }
}

impl<CLK, DAT, CS, D> ChannelSelector for Rx5808<CLK, DAT, CS, D>
where
    CLK: OutputPin,
    DAT: OutputPin,
    CS: OutputPin,
    D: DelayNs,
{
    fn select(&mut self, band: Band, channel: u8) -> Result<(), VtxError> {
        self.set_channel(band, channel)
    }

    fn set_video_mode(&mut self, mode: VideoMode) -> Result<(), VtxError> {
        self.set_mode(mode)
    }

    fn selected(&self) -> Option<(Band, u8)> {
        self.current
    }
}
