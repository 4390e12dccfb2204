//! The numeric tolerance policy shared by the solver's feasibility checks and by strategy
//! comparisons.
use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};

/// The default relative tolerance
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Tolerance used when comparing volumes and costs.
///
/// Comparisons are relative to the magnitude of the values involved, but never tighter than the
/// tolerance itself in absolute terms, so that values close to zero can still be compared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance(pub f64);

impl Default for Tolerance {
    fn default() -> Self {
        Self(DEFAULT_TOLERANCE)
    }
}

impl Tolerance {
    /// The absolute margin to allow when comparing values of the given magnitude
    pub fn margin(self, scale: f64) -> f64 {
        self.0 * scale.abs().max(1.0)
    }

    /// Whether `a` and `b` are equal within tolerance
    pub fn approx_eq(self, a: f64, b: f64) -> bool {
        approx_eq!(f64, a, b, epsilon = self.margin(a.abs().max(b.abs())))
    }

    /// Whether `a` is no greater than `b`, allowing for the tolerance
    pub fn le(self, a: f64, b: f64) -> bool {
        a <= b + self.margin(a.abs().max(b.abs()))
    }

    /// Whether the value is indistinguishable from zero
    pub fn is_zero(self, value: f64) -> bool {
        value.abs() <= self.0
    }

    /// The relative difference between `a` and `b`
    pub fn relative_difference(a: f64, b: f64) -> f64 {
        let scale = a.abs().max(b.abs());
        if scale == 0.0 {
            0.0
        } else {
            (a - b).abs() / scale.max(1.0)
        }
    }
}
