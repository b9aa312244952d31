//! Additive quantile band around a point estimate

/// Fallback 5th percentile residual
pub const Q05_FALLBACK: f64 = -12.0;

/// Fallback 95th percentile residual
pub const Q95_FALLBACK: f64 = 12.0;

/// Applies fixed q05/q95 residual offsets, clamping both bounds at zero
///
/// The offsets are not checked for `q05 <= q95`; an inverted pair yields an
/// inverted band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalEstimator {
    q05: f64,
    q95: f64,
}

impl IntervalEstimator {
    pub fn new(q05: f64, q95: f64) -> Self {
        Self { q05, q95 }
    }

    pub fn q05(&self) -> f64 {
        self.q05
    }

    pub fn q95(&self) -> f64 {
        self.q95
    }

    /// Returns `(lower, upper)`
    pub fn estimate(&self, point: f64) -> (f64, f64) {
        ((point + self.q05).max(0.0), (point + self.q95).max(0.0))
    }
}

impl Default for IntervalEstimator {
    fn default() -> Self {
        Self::new(Q05_FALLBACK, Q95_FALLBACK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_around_point() {
        let est = IntervalEstimator::default();
        assert_eq!(est.estimate(51.0), (39.0, 63.0));
    }

    #[test]
    fn test_lower_bound_clamped_at_zero() {
        let est = IntervalEstimator::default();
        assert_eq!(est.estimate(5.0), (0.0, 17.0));
        assert_eq!(est.estimate(-20.0), (0.0, 0.0));
    }

    #[test]
    fn test_bounds_ordered_for_ordered_offsets() {
        let est = IntervalEstimator::new(-3.5, 8.25);
        for p in [0.0, 1.0, 3.5, 17.2, 250.0] {
            let (lo, hi) = est.estimate(p);
            assert!(lo >= 0.0 && hi >= 0.0);
            assert!(lo <= hi, "lo {} > hi {} for point {}", lo, hi, p);
            assert!(lo <= p.max(0.0) && p <= hi);
        }
    }

    #[test]
    fn test_inverted_offsets_are_not_corrected() {
        let est = IntervalEstimator::new(5.0, -5.0);
        assert_eq!(est.estimate(50.0), (55.0, 45.0));
    }
}
