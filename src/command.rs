//! External command records and the single-slot control mailbox.
//!
//! Collaborators deliver commands however they like (HTTP body, socket
//! message); by the time one reaches the core it is a typed [`Command`].
//! Commands are deposited into a [`CommandMailbox`] that the control loop
//! drains at the top of each tick — a single slot where the latest posting
//! wins, which is the right semantics for a human mashing direction
//! buttons faster than the loop runs.

use core::cell::RefCell;
use core::str::FromStr;

use thiserror::Error;

use crate::vtx::{Band, VideoMode};

/// A command that was not recognized or carried invalid parameters.
///
/// Rejected commands leave the state machine untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid command")]
pub struct InvalidCommand;

/// Everything the outside world can ask the tracker to do.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "command", rename_all = "snake_case")
)]
pub enum Command {
    /// Step left by the configured manual step; enters Manual.
    Left,
    /// Step right by the configured manual step; enters Manual.
    Right,
    /// Move to the calibrated center; enters Manual.
    Home,
    /// Enter automatic tracking.
    Auto,
    /// Enter manual control.
    Manual,
    /// Start an angular scan.
    Scan,
    /// Start the noise-floor calibration pass.
    Calibrate,
    /// Start the maximum-signal calibration pass.
    CalibrateMax,
    /// Move to an absolute angle in degrees; enters Manual.
    SetAngle {
        /// Target angle, clamped into `[0, span]`.
        degrees: f32,
    },
    /// Capture the present position as the new center.
    SetCenter,
    /// Capture the present position as the new left limit.
    SetLeftLimit,
    /// Capture the present position as the new right limit.
    SetRightLimit,
    /// Tune the receiver in the foreground.
    VtxSet {
        /// Target band.
        band: Band,
        /// Target channel, 1..=8.
        channel: u8,
    },
    /// Switch the receiver video mode.
    VtxMode {
        /// Mix or Diversity.
        mode: VideoMode,
    },
    /// Launch a background band scan if none is running.
    VtxScanStart {
        /// Settle time per cell; clamped up to the receiver floor.
        settle_ms: Option<u32>,
    },
}

impl Command {
    /// Checks the parameter ranges a typed record can still get wrong.
    pub fn validate(&self) -> Result<(), InvalidCommand> {
        match *self {
            Command::VtxSet { channel, .. } if !(1..=8).contains(&channel) => Err(InvalidCommand),
            Command::SetAngle { degrees } if !degrees.is_finite() => Err(InvalidCommand),
            _ => Ok(()),
        }
    }
}

impl FromStr for Command {
    type Err = InvalidCommand;

    /// Parses the parameterless command names used by simple transports.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Command::Left),
            "right" => Ok(Command::Right),
            "home" => Ok(Command::Home),
            "auto" => Ok(Command::Auto),
            "manual" => Ok(Command::Manual),
            "scan" => Ok(Command::Scan),
            "calibrate" => Ok(Command::Calibrate),
            "calibrate_max" => Ok(Command::CalibrateMax),
            "set_center" => Ok(Command::SetCenter),
            "set_left_limit" => Ok(Command::SetLeftLimit),
            "set_right_limit" => Ok(Command::SetRightLimit),
            _ => Err(InvalidCommand),
        }
    }
}

/// Single-slot mailbox between command producers and the control loop.
///
/// Posting replaces any undrained command; the control loop takes at most
/// one per tick. Interior mutability goes through a `critical-section`
/// mutex so the same type serves interrupt-driven and threaded hosts.
pub struct CommandMailbox {
    slot: critical_section::Mutex<RefCell<Option<Command>>>,
}

impl CommandMailbox {
    /// Creates an empty mailbox.
    pub const fn new() -> Self {
        Self {
            slot: critical_section::Mutex::new(RefCell::new(None)),
        }
    }

    /// Deposits a command, returning the one it displaced, if any.
    pub fn post(&self, command: Command) -> Option<Command> {
        critical_section::with(|cs| self.slot.borrow(cs).replace(Some(command)))
    }

    /// Removes and returns the pending command.
    pub fn take(&self) -> Option<Command> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }
}

impl Default for CommandMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CommandMailbox {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("CommandMailbox")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_parse() {
        assert_eq!("left".parse(), Ok(Command::Left));
        assert_eq!("calibrate_max".parse(), Ok(Command::CalibrateMax));
        assert_eq!("set_left_limit".parse(), Ok(Command::SetLeftLimit));
    }

    #[test]
    fn unknown_name_is_invalid() {
        assert_eq!(Command::from_str("warp"), Err(InvalidCommand));
        assert_eq!(Command::from_str(""), Err(InvalidCommand));
    }

    #[test]
    fn vtx_channel_range_is_validated() {
        let good = Command::VtxSet {
            band: Band::R,
            channel: 4,
        };
        let bad = Command::VtxSet {
            band: Band::R,
            channel: 9,
        };
        assert_eq!(good.validate(), Ok(()));
        assert_eq!(bad.validate(), Err(InvalidCommand));
    }

    #[test]
    fn non_finite_angle_is_invalid() {
        let bad = Command::SetAngle {
            degrees: f32::NAN,
        };
        assert_eq!(bad.validate(), Err(InvalidCommand));
    }

    #[test]
    fn mailbox_latest_posting_wins() {
        let mailbox = CommandMailbox::new();
        assert_eq!(mailbox.post(Command::Left), None);
        assert_eq!(mailbox.post(Command::Right), Some(Command::Left));
        assert_eq!(mailbox.take(), Some(Command::Right));
        assert_eq!(mailbox.take(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn commands_deserialize_from_tagged_records() {
        let cmd: Command = serde_json::from_str(r#"{"command":"left"}"#).unwrap();
        assert_eq!(cmd, Command::Left);
        let cmd: Command =
            serde_json::from_str(r#"{"command":"set_angle","degrees":73.0}"#).unwrap();
        assert_eq!(cmd, Command::SetAngle { degrees: 73.0 });
        let cmd: Command =
            serde_json::from_str(r#"{"command":"vtx_set","band":"R","channel":4}"#).unwrap();
        assert_eq!(
            cmd,
            Command::VtxSet {
                band: Band::R,
                channel: 4
            }
        );
        assert!(serde_json::from_str::<Command>(r#"{"command":"warp"}"#).is_err());
    }
}
