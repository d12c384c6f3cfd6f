//! Read-only snapshots published to external collaborators.
//!
//! The control surface (HTTP, sockets, whatever the integration chooses)
//! never reaches into the state machine; it reads these copy-on-publish
//! records. Field names and units are stable: angles in servo units and
//! degrees, RSSI in filtered post-calibration counts, voltage in volts,
//! timestamps in monotonic seconds.

use crate::tracker::Mode;
use crate::vtx::Band;

#[cfg(not(feature = "std"))]
use crate::consts::SCAN_MAX_SAMPLES;

/// Receiver state as last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VtxStatus {
    /// Selected band.
    pub band: Band,
    /// Selected channel, 1..=8.
    pub channel: u8,
    /// Carrier frequency of the selection, MHz.
    pub frequency_mhz: u16,
    /// Whether a channel has been successfully applied since boot.
    pub initialized: bool,
    /// Last receiver control failure, if any.
    pub error: Option<&'static str>,
}

impl Default for VtxStatus {
    fn default() -> Self {
        Self {
            band: Band::A,
            channel: 1,
            frequency_mhz: 5865,
            initialized: false,
            error: None,
        }
    }
}

/// One band/channel cell reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanCell {
    /// Band of the cell.
    pub band: Band,
    /// Channel of the cell, 1..=8.
    pub channel: u8,
}

/// The strongest cell seen so far in a band scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BestCell {
    /// Band of the winning cell.
    pub band: Band,
    /// Channel of the winning cell, 1..=8.
    pub channel: u8,
    /// Summed left+right RSSI recorded there.
    pub rssi: i32,
}

/// The 6×8 summed-RSSI table filled by a band scan.
///
/// Rows follow the scan band order `A, B, E, F, R, L`; empty cells have
/// not been visited (yet, or the scan aborted before them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridCells(
    /// Cell sums in band-major order, channels 1..=8 left to right.
    pub [[Option<i32>; 8]; 6],
);

impl GridCells {
    /// The recorded sum for a cell, if visited.
    pub fn get(&self, band: Band, channel: u8) -> Option<i32> {
        self.0[band.index()][usize::from(channel - 1)]
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for GridCells {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(Band::ALL.len()))?;
        for band in Band::ALL {
            map.serialize_entry(&band, &self.0[band.index()])?;
        }
        map.end()
    }
}

/// Progress of the background band scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VtxScanStatus {
    /// Whether a scan is currently running.
    pub in_progress: bool,
    /// Cell being measured right now.
    pub current: Option<ScanCell>,
    /// Summed-RSSI table filled so far.
    pub grid: GridCells,
    /// Strongest cell seen so far.
    pub best: Option<BestCell>,
}

/// One recorded angular-scan station.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanSample {
    /// Commanded servo position of the station.
    pub position: i32,
    /// Station angle in degrees.
    pub angle: f32,
    /// Mean filtered left RSSI over the station reads.
    pub left_rssi: i32,
    /// Mean filtered right RSSI over the station reads.
    pub right_rssi: i32,
    /// `left_rssi + right_rssi`.
    pub total_rssi: i32,
    /// `|left_rssi - right_rssi|`.
    pub difference: i32,
}

/// Ordered angular-scan record, oldest station first.
#[cfg(feature = "std")]
pub type ScanData = Vec<ScanSample>;

/// Ordered angular-scan record, oldest station first.
#[cfg(not(feature = "std"))]
pub type ScanData = heapless::Vec<ScanSample, SCAN_MAX_SAMPLES>;

/// Outcome of the latest angular scan, readable until the next scan starts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ScanResults {
    /// Whether the scan ran to completion and selected a boresight.
    pub scan_complete: bool,
    /// Monotonic completion time, seconds.
    pub timestamp_s: f64,
    /// Servo position of the selected boresight.
    pub best_position: i32,
    /// Angle of the selected boresight, degrees.
    pub best_angle: f32,
    /// |L - R| at the selected boresight.
    pub min_difference: i32,
    /// Every recorded station in position order.
    pub scan_data: ScanData,
}

/// Snapshot of the whole tracker, produced on every control tick.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrackerStatus {
    /// Current state-machine mode.
    pub mode: Mode,
    /// Commanded servo position, units.
    pub angle: i32,
    /// Commanded position as degrees, 0.1° resolution.
    pub angle_degrees: f32,
    /// Filtered left RSSI, post-calibration counts.
    pub rssi_a: i32,
    /// Filtered right RSSI, post-calibration counts.
    pub rssi_b: i32,
    /// Whether the servo reports motion.
    pub servo_moving: bool,
    /// Servo supply voltage, volts (tenths precision).
    #[cfg_attr(feature = "serde", serde(rename = "servo_voltage_V"))]
    pub servo_voltage_v: f32,
    /// Servo temperature, °C.
    #[cfg_attr(feature = "serde", serde(rename = "servo_temperature_C"))]
    pub servo_temperature_c: i32,
    /// Receiver state.
    pub vtx: VtxStatus,
    /// Band-scan progress.
    pub vtx_scan: VtxScanStatus,
    /// Monotonic snapshot time, seconds.
    pub timestamp_s: f64,
}

impl Default for TrackerStatus {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            angle: 0,
            angle_degrees: 0.0,
            rssi_a: 0,
            rssi_b: 0,
            servo_moving: false,
            servo_voltage_v: 0.0,
            servo_temperature_c: 0,
            vtx: VtxStatus::default(),
            vtx_scan: VtxScanStatus::default(),
            timestamp_s: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_lookup_by_band_and_channel() {
        let mut cells = GridCells::default();
        cells.0[Band::R.index()][3] = Some(9_000);
        assert_eq!(cells.get(Band::R, 4), Some(9_000));
        assert_eq!(cells.get(Band::R, 5), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn status_serializes_with_stable_names() {
        let status = TrackerStatus {
            mode: Mode::Auto,
            angle: 2047,
            angle_degrees: 86.4,
            servo_voltage_v: 12.5,
            servo_temperature_c: 35,
            ..TrackerStatus::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["mode"], "auto");
        assert_eq!(json["angle"], 2047);
        assert_eq!(json["servo_voltage_V"], 12.5);
        assert_eq!(json["servo_temperature_C"], 35);
        assert!(json["vtx"]["initialized"].is_boolean());
        assert!(json["vtx_scan"]["grid"]["A"].is_array());
        assert_eq!(json["vtx_scan"]["best"], serde_json::Value::Null);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn scan_results_serialize_station_fields() {
        let results = ScanResults {
            scan_complete: true,
            timestamp_s: 12.5,
            best_position: 2000,
            best_angle: 82.1,
            min_difference: 3,
            scan_data: vec![ScanSample {
                position: 2000,
                angle: 82.1,
                left_rssi: 900,
                right_rssi: 897,
                total_rssi: 1797,
                difference: 3,
            }],
        };
        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["scan_complete"], true);
        assert_eq!(json["scan_data"][0]["total_rssi"], 1797);
    }
}
