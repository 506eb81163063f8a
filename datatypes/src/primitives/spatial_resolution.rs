use float_cmp::approx_eq;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The spatial resolution in SRS units, i.e. the absolute size of one pixel
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SpatialResolution {
    pub x: f64,
    pub y: f64,
}

impl SpatialResolution {
    pub fn new_unchecked(x: f64, y: f64) -> Self {
        SpatialResolution { x, y }
    }

    /// Compares two resolutions with a relative tolerance.
    ///
    /// Resolutions read back from different files of the same grid often differ
    /// in the last bits of their decimal representation.
    pub fn approx_eq(&self, other: &Self) -> bool {
        const RELATIVE_EPSILON: f64 = 1e-9;

        let close = |a: f64, b: f64| {
            approx_eq!(f64, a, b, ulps = 4)
                || (a - b).abs() <= RELATIVE_EPSILON * a.abs().max(b.abs())
        };

        close(self.x, other.x) && close(self.y, other.y)
    }
}

impl fmt::Display for SpatialResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_eq_tolerates_rounding() {
        let a = SpatialResolution::new_unchecked(0.2, 0.2);
        let b = SpatialResolution::new_unchecked(0.200_000_000_000_01, 0.2);

        assert!(a.approx_eq(&b));
    }

    #[test]
    fn approx_eq_detects_different_grids() {
        let a = SpatialResolution::new_unchecked(0.2, 0.2);
        let b = SpatialResolution::new_unchecked(0.5, 0.2);

        assert!(!a.approx_eq(&b));
    }
}
