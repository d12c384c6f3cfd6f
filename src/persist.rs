//! Optional JSON persistence for the RSSI calibration constants.
//!
//! The tracker does not require any persisted state. A host that wants
//! calibration to survive power cycles stores the record after a
//! successful noise-floor pass and feeds it back through
//! [`crate::tracker::TrackerCore::restore_calibration`] at boot, so a
//! restart does not force the operator to pull the antennas off again.
//!
//! The record is deliberately small and flat:
//!
//! ```json
//! { "noise_floor_left": 105, "noise_floor_right": 120,
//!   "rssi_offset": -15, "timestamp_s": 12.5 }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rssi::Calibration;

/// Calibration file problems.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Reading or writing the file failed.
    #[error("calibration file i/o failed")]
    Io(#[from] std::io::Error),
    /// The file exists but does not parse as a calibration record.
    #[error("calibration file malformed")]
    Format(#[from] serde_json::Error),
}

/// On-disk shape of the persisted calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Mean raw counts on the left channel with no antennas fitted.
    pub noise_floor_left: i32,
    /// Mean raw counts on the right channel with no antennas fitted.
    pub noise_floor_right: i32,
    /// Offset added to the right channel to equalize the chains.
    pub rssi_offset: i32,
    /// Monotonic time the calibration was taken, seconds.
    pub timestamp_s: f64,
}

/// Loads a stored calibration. A missing file is not an error.
pub fn load(path: &Path) -> Result<Option<Calibration>, PersistError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let record: CalibrationRecord = serde_json::from_str(&text)?;
    Ok(Some(Calibration {
        noise_floor_left: record.noise_floor_left,
        noise_floor_right: record.noise_floor_right,
        rssi_offset: record.rssi_offset,
        rssi_max_left: None,
        rssi_max_right: None,
    }))
}

/// Stores the noise-floor portion of a calibration.
pub fn store(
    path: &Path,
    calibration: &Calibration,
    timestamp_s: f64,
) -> Result<(), PersistError> {
    let record = CalibrationRecord {
        noise_floor_left: calibration.noise_floor_left,
        noise_floor_right: calibration.noise_floor_right,
        rssi_offset: calibration.rssi_offset,
        timestamp_s,
    };
    let text = serde_json::to_string_pretty(&record)?;
    fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("monopulse-{}-{}.json", name, std::process::id()))
    }

    #[test]
    fn round_trip_preserves_floor_and_offset() {
        let path = scratch_path("roundtrip");
        let calibration = Calibration {
            noise_floor_left: 105,
            noise_floor_right: 120,
            rssi_offset: -15,
            rssi_max_left: Some(3_000),
            rssi_max_right: Some(2_900),
        };
        store(&path, &calibration, 42.0).unwrap();
        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.noise_floor_left, 105);
        assert_eq!(loaded.noise_floor_right, 120);
        assert_eq!(loaded.rssi_offset, -15);
        // Maxima are informational and not persisted.
        assert_eq!(loaded.rssi_max_left, None);
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_loads_as_none() {
        let path = scratch_path("missing");
        assert!(load(&path).unwrap().is_none());
    }

    #[test]
    fn garbage_file_is_a_format_error() {
        let path = scratch_path("garbage");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load(&path), Err(PersistError::Format(_))));
        fs::remove_file(&path).unwrap();
    }
}
