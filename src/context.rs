//! Per-test measurement state owned by a worker.

use crate::config::WorkerSettings;
use crate::error::CronometroError;
use crate::histogram::{HdrLatencyHistogram, LatencyHistogram};
use crate::result::TestResult;
use crate::tracker::Tracker;
use std::time::Instant;

/// Early-stop checks start once this share of the run is done (hundredths of a percent).
const FIRST_CHECK_AT: u64 = 1_000;
/// After the first check, re-check every this many hundredths of a percent.
const CHECK_EVERY: u64 = 500;

/// Mutable state of one measurement pass.
///
/// Created when a worker begins a pass, touched once per iteration and
/// dropped once the pass has produced its result.
#[derive(Debug)]
pub struct TestContext<H = HdrLatencyHistogram> {
    name: String,
    /// Stop once `standard error / mean` drops below this fraction. Zero disables early stop.
    error_threshold: f64,
    /// The loop runs until `executed > total`.
    total: u64,
    tracker: Tracker<H>,
    started_at: Instant,
}

impl TestContext<HdrLatencyHistogram> {
    pub fn new(name: impl Into<String>, settings: &WorkerSettings) -> Result<Self, CronometroError> {
        Ok(Self::with_tracker(name, settings, Tracker::new()?))
    }
}

impl<H: LatencyHistogram> TestContext<H> {
    pub fn with_tracker(name: impl Into<String>, settings: &WorkerSettings, tracker: Tracker<H>) -> Self {
        Self {
            name: name.into(),
            error_threshold: settings.error_threshold,
            total: settings.iterations.saturating_sub(1),
            tracker,
            started_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn executed(&self) -> u64 {
        self.tracker.iterations()
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<H> {
        &mut self.tracker
    }

    /// Mark the start of an iteration.
    #[inline]
    pub fn start_iteration(&mut self) {
        self.started_at = Instant::now();
    }

    /// Record the time elapsed since [`start_iteration`](Self::start_iteration).
    #[inline]
    pub fn finish_iteration(&mut self) {
        let nanos = u64::try_from(self.started_at.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.tracker.track(nanos);
    }

    /// Whether the loop is exhausted or the run is already precise enough.
    pub fn should_stop(&self) -> bool {
        self.executed() > self.total || self.below_error_threshold()
    }

    fn below_error_threshold(&self) -> bool {
        if self.error_threshold <= 0.0 {
            return false;
        }
        let executed = self.executed();
        if !is_checkpoint(executed, self.total) {
            return false;
        }

        let histogram = self.tracker.histogram();
        let relative_error = histogram.stddev() / (executed as f64).sqrt() / histogram.mean();
        tracing::trace!(
            test = %self.name,
            executed,
            relative_error,
            threshold = self.error_threshold,
            "early stop check"
        );
        relative_error < self.error_threshold
    }

    pub fn results(&self) -> TestResult {
        self.tracker.results()
    }
}

/// Completed share of the run, in hundredths of a percent.
fn completed_percentage(executed: u64, total: u64) -> Option<u64> {
    if total == 0 {
        return None;
    }
    Some((u128::from(executed) * 10_000 / u128::from(total)) as u64)
}

/// True at 10% completion and at every further 5% step.
fn is_checkpoint(executed: u64, total: u64) -> bool {
    match completed_percentage(executed, total) {
        Some(pct) => pct >= FIRST_CHECK_AT && pct % CHECK_EVERY == 0,
        None => false,
    }
}
