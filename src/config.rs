//! Configuration for a benchmark run.

use crate::error::{CronometroError, TestError};
use crate::isolation::WorkerHandle;
use crate::result::TestResult;
use crate::worker::WorkerData;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Default number of iterations per test.
pub const DEFAULT_ITERATIONS: i64 = 10_000;
/// Default early-stop threshold, in percent.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 1.0;

/// Called right after a test's worker was spawned.
pub type TestStartHook = Arc<dyn Fn(&str, &WorkerData, &WorkerHandle) + Send + Sync>;
/// Called when a worker delivered its result.
pub type TestEndHook = Arc<dyn Fn(&str, &TestResult, &WorkerHandle) + Send + Sync>;
/// Called when the isolation boundary itself failed. The handle is absent if
/// the worker could not even be spawned.
pub type TestErrorHook = Arc<dyn Fn(&str, &TestError, Option<&WorkerHandle>) + Send + Sync>;

/// How the console reporter relates tests to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareMode {
    /// Compare every test against the slowest one.
    #[default]
    Base,
    /// Compare every test against the one printed right before it.
    Previous,
}

/// Console output settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOptions {
    pub colors: bool,
    pub compare: bool,
    pub compare_mode: CompareMode,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            colors: true,
            compare: false,
            compare_mode: CompareMode::Base,
        }
    }
}

/// Options for a benchmark run.
#[derive(Clone)]
pub struct RunOptions {
    /// Iterations per test. Must be at least 1.
    pub iterations: i64,
    /// Run a discarded pass before the measured one.
    pub warmup: bool,
    /// Early-stop threshold on `standard error / mean`, in percent (0 disables).
    pub error_threshold: f64,
    /// Console output; `None` disables printing.
    pub print: Option<PrintOptions>,
    pub on_test_start: Option<TestStartHook>,
    pub on_test_end: Option<TestEndHook>,
    pub on_test_error: Option<TestErrorHook>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            warmup: true,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            print: Some(PrintOptions::default()),
            on_test_start: None,
            on_test_end: None,
            on_test_error: None,
        }
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("iterations", &self.iterations)
            .field("warmup", &self.warmup)
            .field("error_threshold", &self.error_threshold)
            .field("print", &self.print)
            .field("on_test_start", &self.on_test_start.is_some())
            .field("on_test_end", &self.on_test_end.is_some())
            .field("on_test_error", &self.on_test_error.is_some())
            .finish()
    }
}

impl RunOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from environment variables.
    ///
    /// Supported variables:
    /// - `CRONOMETRO_ITERATIONS`: iterations per test (default: 10000)
    /// - `CRONOMETRO_WARMUP`: warmup pass (default: true)
    /// - `CRONOMETRO_ERROR_THRESHOLD`: early-stop threshold in percent (default: 1)
    /// - `CRONOMETRO_PRINT`: console output (default: true)
    ///
    /// Values that do not parse are ignored. Range checks happen in [`validate`](Self::validate).
    pub fn from_env() -> Self {
        let mut opts = Self::default();

        if let Ok(v) = std::env::var("CRONOMETRO_ITERATIONS") {
            if let Ok(n) = v.trim().parse() {
                opts.iterations = n;
            }
        }
        if let Ok(v) = std::env::var("CRONOMETRO_WARMUP") {
            opts.warmup = parse_flag(&v);
        }
        if let Ok(v) = std::env::var("CRONOMETRO_ERROR_THRESHOLD") {
            if let Ok(t) = v.trim().parse() {
                opts.error_threshold = t;
            }
        }
        if let Ok(v) = std::env::var("CRONOMETRO_PRINT") {
            opts.print = parse_flag(&v).then(PrintOptions::default);
        }

        opts
    }

    /// Set the number of iterations.
    pub fn iterations(mut self, n: i64) -> Self {
        self.iterations = n;
        self
    }

    /// Enable or disable the warmup pass.
    pub fn warmup(mut self, enabled: bool) -> Self {
        self.warmup = enabled;
        self
    }

    /// Set the early-stop threshold in percent.
    pub fn error_threshold(mut self, percent: f64) -> Self {
        self.error_threshold = percent;
        self
    }

    /// Enable console output with default settings, or disable it.
    pub fn print(mut self, enabled: bool) -> Self {
        self.print = enabled.then(PrintOptions::default);
        self
    }

    /// Enable console output with explicit settings.
    pub fn print_options(mut self, print: PrintOptions) -> Self {
        self.print = Some(print);
        self
    }

    pub fn on_test_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &WorkerData, &WorkerHandle) + Send + Sync + 'static,
    {
        self.on_test_start = Some(Arc::new(hook));
        self
    }

    pub fn on_test_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &TestResult, &WorkerHandle) + Send + Sync + 'static,
    {
        self.on_test_end = Some(Arc::new(hook));
        self
    }

    pub fn on_test_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &TestError, Option<&WorkerHandle>) + Send + Sync + 'static,
    {
        self.on_test_error = Some(Arc::new(hook));
        self
    }

    /// Check bounds and derive what every worker needs.
    pub fn validate(&self) -> Result<WorkerSettings, CronometroError> {
        if self.iterations < 1 {
            return Err(CronometroError::InvalidIterations(self.iterations));
        }
        // NaN fails both comparisons.
        if !(self.error_threshold >= 0.0 && self.error_threshold <= 100.0) {
            return Err(CronometroError::InvalidErrorThreshold(self.error_threshold));
        }

        Ok(WorkerSettings {
            iterations: self.iterations as u64,
            warmup: self.warmup,
            error_threshold: self.error_threshold / 100.0,
        })
    }
}

/// Validated, serializable subset of [`RunOptions`] shipped to each worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSettings {
    pub iterations: u64,
    pub warmup: bool,
    /// Early-stop threshold as a fraction (percent / 100).
    pub error_threshold: f64,
}

fn parse_flag(v: &str) -> bool {
    let v = v.trim();
    v != "0" && !v.eq_ignore_ascii_case("false")
}
