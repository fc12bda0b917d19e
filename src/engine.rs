//! The iteration engine: drives one test through its measurement loop.
//!
//! A pass moves through `setup -> running -> (stopped | errored) -> teardown`:
//!
//! 1. `before` runs once. If it fails the pass ends with that error; neither
//!    the body nor `after` runs.
//! 2. The body runs until the iteration budget is exhausted, the early-stop
//!    rule fires, or an iteration fails. Any failing iteration invalidates the
//!    whole pass.
//! 3. `after` runs once. Its error replaces the pass result, even a successful one.
//!
//! With warmup enabled, a pass without teardown is run and thrown away before
//! the measured pass: `before` runs twice, `after` once.

use crate::config::WorkerSettings;
use crate::context::TestContext;
use crate::definition::{Done, Routine, TestDefinition};
use crate::error::TestError;
use crate::result::TestResult;
use std::panic::{self, AssertUnwindSafe};
use tracing::debug;

/// Runs the passes of a single test. Lives entirely inside one worker.
pub struct IterationEngine {
    definition: TestDefinition,
    driver: Driver,
}

impl IterationEngine {
    pub fn new(definition: TestDefinition) -> Self {
        Self {
            definition,
            driver: Driver::default(),
        }
    }

    /// Run the test: the optional warmup pass, then the measured pass.
    pub fn run(&mut self, name: &str, settings: &WorkerSettings) -> TestResult {
        if settings.warmup {
            let discarded = self.run_pass(name, settings, false);
            debug!(test = name, size = discarded.size, "warmup pass finished");
        }
        self.run_pass(name, settings, true)
    }

    /// Run one pass: setup, measurement loop and, if `teardown`, the `after` hook.
    fn run_pass(&mut self, name: &str, settings: &WorkerSettings, teardown: bool) -> TestResult {
        let mut ctx = match TestContext::new(name, settings) {
            Ok(ctx) => ctx,
            Err(e) => return TestResult::failure(TestError::from(&e)),
        };

        if let Some(before) = self.definition.before.as_mut() {
            if let Err(error) = self.driver.call(before, None) {
                debug!(test = name, %error, "setup failed");
                return TestResult::failure(error);
            }
        }

        let mut noop = Routine::sync(|| Ok(()));
        let test = match self.definition.test.as_mut() {
            Some(test) => test,
            None => &mut noop,
        };

        loop {
            if let Err(error) = self.driver.call(test, Some(&mut ctx)) {
                debug!(test = name, executed = ctx.executed(), %error, "iteration failed");
                ctx.tracker_mut().fail(error);
                break;
            }
            if ctx.should_stop() {
                break;
            }
        }

        let result = ctx.results();
        debug!(test = name, size = result.size, success = result.success, "pass finished");

        if !teardown {
            return result;
        }
        if let Some(after) = self.definition.after.as_mut() {
            if let Err(error) = self.driver.call(after, None) {
                debug!(test = name, %error, "teardown failed");
                return TestResult::failure(error);
            }
        }

        result
    }
}

/// Invokes routines under their calling convention.
#[derive(Default)]
struct Driver {
    #[cfg(feature = "async")]
    runtime: Option<tokio::runtime::Runtime>,
}

impl Driver {
    /// Invoke `routine` once and wait for it to complete.
    ///
    /// With a context, the call is timed and recorded, failed or not.
    fn call(&mut self, routine: &mut Routine, mut ctx: Option<&mut TestContext>) -> Result<(), TestError> {
        match routine {
            Routine::Sync(f) => {
                start(&mut ctx);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| f()));
                finish(&mut ctx);
                match outcome {
                    Ok(result) => result.map_err(TestError::from),
                    Err(payload) => Err(TestError::from_panic(payload)),
                }
            }
            Routine::Callback(f) => {
                let (done, rx) = Done::channel();
                start(&mut ctx);
                // Panics are deliberately not caught here: they take the worker down.
                f(done);
                let outcome = rx.recv();
                finish(&mut ctx);
                outcome.unwrap_or_else(|_| {
                    Err(TestError::new("completion signal dropped without being invoked"))
                })
            }
            #[cfg(feature = "async")]
            Routine::Async(f) => {
                let runtime = self.runtime()?;
                start(&mut ctx);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(f())));
                finish(&mut ctx);
                match outcome {
                    Ok(result) => result.map_err(TestError::from),
                    Err(payload) => {
                        // Do not reuse a runtime a panic unwound through.
                        self.runtime = None;
                        Err(TestError::from_panic(payload))
                    }
                }
            }
        }
    }

    #[cfg(feature = "async")]
    fn runtime(&mut self) -> Result<&tokio::runtime::Runtime, TestError> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .map_err(|e| TestError::new(format!("failed to start async runtime: {}", e)))?;
            self.runtime = Some(runtime);
        }
        match self.runtime.as_ref() {
            Some(runtime) => Ok(runtime),
            None => Err(TestError::new("async runtime unavailable")),
        }
    }
}

#[inline]
fn start(ctx: &mut Option<&mut TestContext>) {
    if let Some(ctx) = ctx.as_deref_mut() {
        ctx.start_iteration();
    }
}

#[inline]
fn finish(ctx: &mut Option<&mut TestContext>) {
    if let Some(ctx) = ctx.as_deref_mut() {
        ctx.finish_iteration();
    }
}
