//! # cronometro
//!
//! A micro-benchmark harness. Each named test runs in an isolated worker, one
//! test at a time, for a fixed number of iterations. Per-iteration durations
//! go into an HDR histogram and come back as summary statistics.
//!
//! A run can stop a test early once the relative standard error of its mean
//! drops below a threshold.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cronometro::{RunOptions, Tests};
//!
//! let tests = Tests::new()
//!     .sync("format", || {
//!         std::hint::black_box(format!("{}-{}", 1, 2));
//!         Ok(())
//!     })
//!     .sync("concat", || {
//!         std::hint::black_box(["1", "2"].concat());
//!         Ok(())
//!     });
//!
//! let results = cronometro::run(tests, RunOptions::new().iterations(5_000))?;
//! for (name, result) in results.iter() {
//!     println!("{}: mean {:.0} ns over {} iterations", name, result.mean, result.size);
//! }
//! # Ok::<(), cronometro::CronometroError>(())
//! ```
//!
//! ## Isolation
//!
//! Tests run on a dedicated thread by default ([`ThreadIsolation`]). With
//! [`ProcessIsolation`] every test gets a fresh copy of the benchmark binary:
//! the entry points recognise a worker process on their own, so `main` only
//! needs to build the test table and call [`run`] as usual.
//!
//! ## Features
//!
//! - **`async`** (default): future-returning tests and [`run_async`]

mod context;
mod definition;
mod engine;
mod error;
mod histogram;
mod message;
mod result;
mod runner;
mod tracker;

pub mod config;
pub mod isolation;
pub mod report;
pub mod worker;

pub use config::{CompareMode, PrintOptions, RunOptions, WorkerSettings};
pub use context::TestContext;
pub use definition::{Done, Routine, TestDefinition, Tests};
pub use engine::IterationEngine;
pub use error::{CronometroError, TestError};
pub use histogram::{HdrLatencyHistogram, LatencyHistogram};
pub use isolation::{Isolation, ProcessIsolation, SpawnedWorker, ThreadIsolation, WorkerHandle, WorkerKind};
pub use message::WorkerMessage;
pub use report::{ConsoleReporter, JsonReporter, MultiReporter, Reporter};
pub use result::{Results, TestResult};
pub use runner::{run, run_with_callback, Runner};
pub use tracker::{Tracker, PERCENTILES};
pub use worker::WorkerData;

#[cfg(feature = "async")]
pub use runner::run_async;
