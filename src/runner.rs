//! The orchestrator.

use crate::config::RunOptions;
use crate::definition::{TestDefinition, Tests};
use crate::error::{CronometroError, TestError};
use crate::isolation::{Isolation, ThreadIsolation};
use crate::report::{ConsoleReporter, MultiReporter, Reporter};
use crate::result::{Results, TestResult};
use crate::worker::{self, WorkerData};
use tracing::{debug, info, warn};

/// Runs a table of tests one after another, each in its own worker.
///
/// # Example
///
/// ```rust,no_run
/// use cronometro::{RunOptions, Runner, Tests};
///
/// let tests = Tests::new()
///     .sync("vec", || {
///         std::hint::black_box(vec![0u8; 64]);
///         Ok(())
///     })
///     .sync("array", || {
///         std::hint::black_box([0u8; 64]);
///         Ok(())
///     });
///
/// let results = Runner::new(RunOptions::new().iterations(1_000)).run(tests)?;
/// assert_eq!(results.len(), 2);
/// # Ok::<(), cronometro::CronometroError>(())
/// ```
pub struct Runner {
    options: RunOptions,
    isolation: Box<dyn Isolation>,
    reporters: MultiReporter,
}

impl Runner {
    /// A runner using thread isolation.
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            isolation: Box::new(ThreadIsolation::default()),
            reporters: MultiReporter::new(Vec::new()),
        }
    }

    pub fn isolation(mut self, isolation: impl Isolation + 'static) -> Self {
        self.isolation = Box::new(isolation);
        self
    }

    /// Add a reporter that runs after the console output.
    ///
    /// A reporter that fails or panics is logged; the results are still returned.
    pub fn add_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Measure every test and return the results in submission order.
    ///
    /// Inside a process worker this measures the assigned test, reports it and
    /// exits without returning.
    pub fn run(&self, tests: Tests) -> Result<Results, CronometroError> {
        if let Some(data) = worker::worker_data_from_env()? {
            worker::serve(tests, &data);
        }

        let settings = self.options.validate()?;
        info!(
            tests = tests.len(),
            iterations = settings.iterations,
            warmup = settings.warmup,
            "starting run"
        );

        let mut results = Results::with_capacity(tests.len());
        for (index, (name, definition)) in tests.into_iter().enumerate() {
            let data = WorkerData {
                index,
                name,
                settings,
            };
            let result = self.run_one(&data, definition);
            results.insert(data.name, result);
        }

        self.report(&results);
        Ok(results)
    }

    /// Like [`run`](Self::run) but on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn run_async(self, tests: Tests) -> Result<Results, CronometroError> {
        tokio::task::spawn_blocking(move || self.run(tests))
            .await
            .map_err(|e| CronometroError::WorkerCrashed(e.to_string()))?
    }

    fn run_one(&self, data: &WorkerData, definition: TestDefinition) -> TestResult {
        let name = data.name.as_str();

        let worker = match self.isolation.spawn(data, definition) {
            Ok(worker) => worker,
            Err(e) => {
                let error = TestError::from(&e);
                warn!(test = name, error = %error, "failed to spawn worker");
                if let Some(hook) = &self.options.on_test_error {
                    hook(name, &error, None);
                }
                return TestResult::failure(error);
            }
        };

        let handle = worker.handle().clone();
        if let Some(hook) = &self.options.on_test_start {
            hook(name, data, &handle);
        }

        match worker.wait() {
            Ok(result) => {
                debug!(test = name, success = result.success, size = result.size, mean = result.mean, "test finished");
                if let Some(hook) = &self.options.on_test_end {
                    hook(name, &result, &handle);
                }
                result
            }
            Err(error) => {
                warn!(test = name, error = %error, "worker failed");
                if let Some(hook) = &self.options.on_test_error {
                    hook(name, &error, Some(&handle));
                }
                TestResult::failure(error)
            }
        }
    }

    fn report(&self, results: &Results) {
        if let Some(print) = self.options.print {
            if let Err(e) = ConsoleReporter::new(print).report(results) {
                warn!(error = %e, "failed to print results");
            }
        }
        if let Err(e) = self.reporters.report(results) {
            warn!(error = %e, "reporter failed");
        }
    }
}

/// Measure `tests` with thread isolation.
pub fn run(tests: Tests, options: RunOptions) -> Result<Results, CronometroError> {
    Runner::new(options).run(tests)
}

/// Measure `tests` and hand the outcome to `callback`.
///
/// The callback is invoked exactly once, with the results or the error that
/// aborted the run.
pub fn run_with_callback<F>(tests: Tests, options: RunOptions, callback: F)
where
    F: FnOnce(Result<Results, CronometroError>),
{
    callback(run(tests, options))
}

/// Measure `tests` without blocking the async runtime.
#[cfg(feature = "async")]
pub async fn run_async(tests: Tests, options: RunOptions) -> Result<Results, CronometroError> {
    Runner::new(options).run_async(tests).await
}
