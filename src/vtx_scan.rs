//! Background scan across the full 6×8 band plan.
//!
//! The scanner walks every band/channel cell in the fixed order
//! `[A, B, E, F, R, L] × 1..=8`, tunes the receiver to each, waits out the
//! settle time, and records the summed left+right RSSI. When the grid is
//! full the receiver is parked on the strongest cell.
//!
//! The scanner itself is a step machine with no threads or sleeps inside;
//! the worker that drives it owns the pacing. That keeps the start-once /
//! abort-on-error semantics and the cell ordering testable without timing.
//!
//! Errors from the receiver abort the scan and leave the partial grid
//! intact; a scan cannot be re-entered while one is in progress.

use thiserror::Error;

use crate::consts::VTX_SETTLE_FLOOR_MS;
use crate::status::{BestCell, GridCells, ScanCell, VtxScanStatus};
use crate::vtx::{Band, ChannelSelector, VtxError};

/// A second scan was requested while one is still running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("vtx scan already in progress")]
pub struct ScanBusy;

/// Summed-RSSI grid with running best-cell tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VtxGrid {
    cells: GridCells,
    best: Option<BestCell>,
}

impl VtxGrid {
    /// Empties every cell and forgets the best.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Records a cell measurement, keeping the best on a strictly-greater
    /// basis (ties go to the first cell encountered).
    pub fn record(&mut self, band: Band, channel: u8, rssi_sum: i32) {
        self.cells.0[band.index()][usize::from(channel - 1)] = Some(rssi_sum);
        let better = match self.best {
            Some(best) => rssi_sum > best.rssi,
            None => true,
        };
        if better {
            self.best = Some(BestCell {
                band,
                channel,
                rssi: rssi_sum,
            });
        }
    }

    /// The filled cells.
    pub fn cells(&self) -> &GridCells {
        &self.cells
    }

    /// The strongest recorded cell, if any.
    pub fn best(&self) -> Option<BestCell> {
        self.best
    }
}

/// Number of cells a full scan visits.
pub const SCAN_CELLS: usize = 48;

/// Start-once step machine over the band plan.
#[derive(Debug, Default)]
pub struct VtxScanner {
    grid: VtxGrid,
    cursor: usize,
    in_progress: bool,
    settle_ms: u32,
}

impl VtxScanner {
    /// Creates an idle scanner with an empty grid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a scan is running.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// The settle time the running scan uses between tune and measure.
    pub fn settle_ms(&self) -> u32 {
        self.settle_ms
    }

    /// Begins a new scan, clearing the grid.
    ///
    /// `settle_ms` below the receiver's RSSI settle floor is clamped up to
    /// it. Fails without disturbing anything if a scan is already running.
    pub fn start(&mut self, settle_ms: Option<u32>) -> Result<u32, ScanBusy> {
        if self.in_progress {
            return Err(ScanBusy);
        }
        self.grid.clear();
        self.cursor = 0;
        self.settle_ms = settle_ms.unwrap_or(VTX_SETTLE_FLOOR_MS).max(VTX_SETTLE_FLOOR_MS);
        self.in_progress = true;
        Ok(self.settle_ms)
    }

    /// The cell the scan is currently on, `None` when idle or past the end.
    pub fn current_cell(&self) -> Option<(Band, u8)> {
        if !self.in_progress || self.cursor >= SCAN_CELLS {
            return None;
        }
        Some((Band::ALL[self.cursor / 8], (self.cursor % 8) as u8 + 1))
    }

    /// Tunes the receiver to the current cell.
    ///
    /// Returns the tuned cell, or `Ok(None)` when every cell has been
    /// visited and [`finalize`](Self::finalize) should run. A receiver
    /// error aborts the scan, keeping the partial grid.
    pub fn select_current<V: ChannelSelector>(
        &mut self,
        vtx: &mut V,
    ) -> Result<Option<(Band, u8)>, VtxError> {
        let Some((band, channel)) = self.current_cell() else {
            return Ok(None);
        };
        match vtx.select(band, channel) {
            Ok(()) => Ok(Some((band, channel))),
            Err(error) => {
                self.abort();
                Err(error)
            }
        }
    }

    /// Records the settled measurement for the current cell and advances.
    pub fn record(&mut self, rssi_sum: i32) {
        if let Some((band, channel)) = self.current_cell() {
            self.grid.record(band, channel, rssi_sum);
            self.cursor += 1;
        }
    }

    /// Stops the scan, keeping whatever the grid holds.
    pub fn abort(&mut self) {
        self.in_progress = false;
    }

    /// Completes the scan: parks the receiver on the strongest cell and
    /// returns it. The scan is over afterwards even if the final tune
    /// fails.
    pub fn finalize<V: ChannelSelector>(
        &mut self,
        vtx: &mut V,
    ) -> Result<Option<BestCell>, VtxError> {
        self.in_progress = false;
        let Some(best) = self.grid.best() else {
            return Ok(None);
        };
        vtx.select(best.band, best.channel)?;
        Ok(Some(best))
    }

    /// The grid filled so far.
    pub fn grid(&self) -> &VtxGrid {
        &self.grid
    }

    /// Copy-on-read progress snapshot for the status record.
    pub fn snapshot(&self) -> VtxScanStatus {
        VtxScanStatus {
            in_progress: self.in_progress,
            current: self
                .current_cell()
                .map(|(band, channel)| ScanCell { band, channel }),
            grid: *self.grid.cells(),
            best: self.grid.best(),
        }
    }
}
