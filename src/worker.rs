//! Worker side of the isolation boundary.
//!
//! A worker measures exactly one test and reports exactly one
//! [`WorkerMessage`]. In a thread worker the definition is moved in directly.
//! A process worker is the benchmark binary re-executed with
//! [`WORKER_DATA_ENV`] set: the entry points notice it, locate the test by
//! index in the table they were given, and exit after reporting.

use crate::config::WorkerSettings;
use crate::definition::{TestDefinition, Tests};
use crate::engine::IterationEngine;
use crate::error::{CronometroError, TestError};
use crate::message::WorkerMessage;
use crate::result::TestResult;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Environment variable carrying the JSON-encoded [`WorkerData`] of a process worker.
pub const WORKER_DATA_ENV: &str = "CRONOMETRO_WORKER_DATA";

/// Everything a worker is told about its test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerData {
    /// Position of the test in the submitted table.
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub settings: WorkerSettings,
}

impl WorkerData {
    pub fn encode(&self) -> Result<String, CronometroError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, CronometroError> {
        serde_json::from_str(raw).map_err(|e| CronometroError::InvalidWorkerData(e.to_string()))
    }
}

/// Measure a single test inside the current worker.
pub fn measure(name: &str, definition: TestDefinition, settings: &WorkerSettings) -> TestResult {
    debug!(test = name, iterations = settings.iterations, warmup = settings.warmup, "measuring");
    IterationEngine::new(definition).run(name, settings)
}

/// Locate the test at `data.index` and measure it.
///
/// Panics escaping the engine (callback-style bodies) become an error message.
pub fn run_worker(mut tests: Tests, data: &WorkerData) -> WorkerMessage {
    let Some((name, definition)) = tests.take(data.index) else {
        return WorkerMessage::Error(TestError::new("No test code exported from the worker thread"));
    };
    if name != data.name {
        warn!(expected = %data.name, found = %name, index = data.index, "test table differs from the orchestrator's");
    }

    match panic::catch_unwind(AssertUnwindSafe(|| measure(&name, definition, &data.settings))) {
        Ok(result) => WorkerMessage::Result(result),
        Err(payload) => WorkerMessage::Error(TestError::from_panic(payload)),
    }
}

/// Worker data of the current process, if it was spawned as a process worker.
pub fn worker_data_from_env() -> Result<Option<WorkerData>, CronometroError> {
    match std::env::var(WORKER_DATA_ENV) {
        Ok(raw) => WorkerData::decode(&raw).map(Some),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(CronometroError::InvalidWorkerData(e.to_string())),
    }
}

/// Run as a process worker: report on stdout and exit.
///
/// Exit code is 0 when the test succeeded and 1 otherwise.
pub fn serve(tests: Tests, data: &WorkerData) -> ! {
    let message = run_worker(tests, data);
    let code = if message.is_success() { 0 } else { 1 };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = message.write_to(&mut stdout) {
        eprintln!("cronometro: failed to report result: {}", e);
        std::process::exit(1);
    }
    std::process::exit(code)
}
