//! Streaming summary statistics.

/// Running mean and variance (Welford's method).
///
/// Matches the population variance over all pushed values; a constant
/// input yields exactly zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one observation.
    #[inline]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of observations.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean, or `None` with no observations.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population variance, or `None` with no observations.
    pub fn variance(&self) -> Option<f64> {
        (self.count > 0).then(|| self.m2 / self.count as f64)
    }

    /// Population standard deviation, or `None` with no observations.
    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_has_no_moments() {
        let stats = RunningStats::new();
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.std_dev(), None);
    }

    #[test]
    fn test_constant_data_zero_variance() {
        let mut stats = RunningStats::new();
        for _ in 0..1000 {
            stats.push(500.0);
        }

        assert_eq!(stats.mean(), Some(500.0));
        assert_eq!(stats.variance(), Some(0.0));
    }

    #[test]
    fn test_known_population_std() {
        // Population std of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2.
        let mut stats = RunningStats::new();
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.push(v);
        }

        assert!((stats.std_dev().unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(stats.count(), 8);
    }
}
