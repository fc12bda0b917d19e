//! Per-test accumulator turning raw timings into a [`TestResult`].

use crate::error::{CronometroError, TestError};
use crate::histogram::{HdrLatencyHistogram, LatencyHistogram};
use crate::result::TestResult;
use std::collections::BTreeMap;

/// Percentile points sampled from the histogram when a test completes.
pub const PERCENTILES: [f64; 15] = [
    0.001, 0.01, 0.1, 1.0, 2.5, 10.0, 25.0, 50.0, 75.0, 90.0, 97.5, 99.0, 99.9, 99.99, 99.999,
];

/// Histogram plus iteration counter plus an optional terminal error.
#[derive(Debug)]
pub struct Tracker<H = HdrLatencyHistogram> {
    histogram: H,
    iterations: u64,
    error: Option<TestError>,
}

impl Tracker<HdrLatencyHistogram> {
    pub fn new() -> Result<Self, CronometroError> {
        Ok(Self::with_histogram(HdrLatencyHistogram::new()?))
    }
}

impl<H: LatencyHistogram> Tracker<H> {
    pub fn with_histogram(histogram: H) -> Self {
        Self {
            histogram,
            iterations: 0,
            error: None,
        }
    }

    /// Record one iteration.
    #[inline]
    pub fn track(&mut self, nanos: u64) {
        self.histogram.record(nanos);
        self.iterations += 1;
    }

    /// Mark the test as failed. The first error wins.
    pub fn fail(&mut self, error: TestError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn error(&self) -> Option<&TestError> {
        self.error.as_ref()
    }

    pub fn histogram(&self) -> &H {
        &self.histogram
    }

    /// `stddev / sqrt(n)`; zero before anything was recorded.
    pub fn standard_error(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        self.histogram.stddev() / (self.iterations as f64).sqrt()
    }

    /// Snapshot of the current state as a result.
    pub fn results(&self) -> TestResult {
        if let Some(error) = &self.error {
            return TestResult::failure(error.clone());
        }

        let percentiles: BTreeMap<String, u64> = PERCENTILES
            .iter()
            .map(|&p| (p.to_string(), self.histogram.value_at_percentile(p)))
            .collect();

        TestResult {
            success: true,
            error: None,
            size: self.iterations,
            min: self.histogram.min(),
            max: self.histogram.max(),
            mean: self.histogram.mean(),
            stddev: self.histogram.stddev(),
            percentiles,
            standard_error: self.standard_error(),
        }
    }
}
