//! Streaming latency histogram.
//!
//! The engine only needs a handful of aggregate queries, so the histogram sits
//! behind [`LatencyHistogram`]. The default implementation is an HDR histogram
//! tracking 1ns..=1s with 5 significant digits.

use crate::error::CronometroError;
use hdrhistogram::Histogram;

/// Lowest discernible duration, in nanoseconds.
pub const LOWEST_DISCERNIBLE_VALUE: u64 = 1;
/// Highest trackable duration, in nanoseconds (one second).
pub const HIGHEST_TRACKABLE_VALUE: u64 = 1_000_000_000;
/// Significant value digits kept by the histogram.
pub const SIGNIFICANT_DIGITS: u8 = 5;

/// Streaming quantile estimator over positive integer durations.
///
/// `record` must stay O(1) amortized: it runs between two timed iterations.
pub trait LatencyHistogram {
    /// Record one duration in nanoseconds.
    fn record(&mut self, nanos: u64);

    /// Number of recorded values.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn min(&self) -> u64;

    fn max(&self) -> u64;

    fn mean(&self) -> f64;

    fn stddev(&self) -> f64;

    /// Estimated value at `percentile` (0.0..=100.0).
    fn value_at_percentile(&self, percentile: f64) -> u64;
}

/// [`LatencyHistogram`] backed by `hdrhistogram`.
#[derive(Debug, Clone)]
pub struct HdrLatencyHistogram {
    inner: Histogram<u64>,
}

impl HdrLatencyHistogram {
    /// Histogram with the default 1ns..=1s range.
    pub fn new() -> Result<Self, CronometroError> {
        Self::with_bounds(
            LOWEST_DISCERNIBLE_VALUE,
            HIGHEST_TRACKABLE_VALUE,
            SIGNIFICANT_DIGITS,
        )
    }

    pub fn with_bounds(low: u64, high: u64, sigfig: u8) -> Result<Self, CronometroError> {
        let inner = Histogram::new_with_bounds(low, high, sigfig)
            .map_err(|e| CronometroError::Histogram(format!("{:?}", e)))?;
        Ok(Self { inner })
    }
}

impl LatencyHistogram for HdrLatencyHistogram {
    #[inline]
    fn record(&mut self, nanos: u64) {
        // Values above the trackable range are clamped rather than dropped.
        self.inner.saturating_record(nanos);
    }

    fn len(&self) -> u64 {
        self.inner.len()
    }

    fn min(&self) -> u64 {
        if self.inner.is_empty() {
            return 0;
        }
        match self.inner.min_nz() {
            u64::MAX => self.inner.min(),
            nz => nz,
        }
    }

    fn max(&self) -> u64 {
        if self.inner.is_empty() {
            0
        } else {
            self.inner.max()
        }
    }

    fn mean(&self) -> f64 {
        if self.inner.is_empty() {
            0.0
        } else {
            self.inner.mean()
        }
    }

    fn stddev(&self) -> f64 {
        if self.inner.is_empty() {
            0.0
        } else {
            self.inner.stdev()
        }
    }

    fn value_at_percentile(&self, percentile: f64) -> u64 {
        if self.inner.is_empty() {
            0
        } else {
            self.inner.value_at_percentile(percentile)
        }
    }
}
