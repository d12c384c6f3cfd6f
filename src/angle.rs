//! Mapping between raw servo units and physical pan angle.
//!
//! The mechanism covers `span_degrees` of travel between the calibrated
//! left and right limits. Angles are reported at 0.1° resolution, with 0°
//! at the left limit.

use libm::roundf;

/// Bidirectional, clamping map between servo units and degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleMap {
    left_limit: i32,
    right_limit: i32,
    span_degrees: f32,
}

impl AngleMap {
    /// Builds a map over `[left_limit, right_limit]` covering `span_degrees`.
    ///
    /// The caller guarantees `left_limit < right_limit` (enforced by
    /// [`crate::config::TrackerConfig::validate`]).
    pub fn new(left_limit: i32, right_limit: i32, span_degrees: f32) -> Self {
        Self {
            left_limit,
            right_limit,
            span_degrees,
        }
    }

    /// Servo units per degree of travel.
    pub fn units_per_degree(&self) -> f32 {
        (self.right_limit - self.left_limit) as f32 / self.span_degrees
    }

    /// Converts a servo position to degrees in `[0, span]`, rounded to 0.1°.
    pub fn position_to_angle(&self, position: i32) -> f32 {
        let range = (self.right_limit - self.left_limit) as f32;
        let ratio = (position - self.left_limit) as f32 / range;
        let degrees = (ratio * self.span_degrees).clamp(0.0, self.span_degrees);
        roundf(degrees * 10.0) / 10.0
    }

    /// Converts an angle to the nearest servo position inside the limits.
    ///
    /// The angle is clamped into `[0, span]` before mapping.
    pub fn angle_to_position(&self, degrees: f32) -> i32 {
        let clamped = degrees.clamp(0.0, self.span_degrees);
        let range = (self.right_limit - self.left_limit) as f32;
        self.left_limit + roundf(clamped / self.span_degrees * range) as i32
    }
}
