//! Isolated execution contexts for tests.
//!
//! Each test runs in a worker of its own so a crash or leaked global state
//! cannot touch another test's measurement. Workers only hand back plain
//! data: one [`WorkerMessage`] each.
//!
//! - [`ThreadIsolation`] (default): one OS thread per test. The definition is
//!   moved into the thread; an escaped panic is reported as the worker error.
//! - [`ProcessIsolation`]: the benchmark binary re-executed per test. The child
//!   rebuilds its test table by running the same `main`, finds its test by
//!   index and reports on stdout.

use crate::definition::TestDefinition;
use crate::error::{CronometroError, TestError};
use crate::message::WorkerMessage;
use crate::result::TestResult;
use crate::worker::{self, WorkerData, WORKER_DATA_ENV};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tracing::warn;

/// Identity of a spawned worker, as seen by observation hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Index of the test the worker runs.
    pub index: usize,
    pub kind: WorkerKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerKind {
    Thread { name: String },
    Process { pid: u32 },
}

/// A way of spawning isolated workers.
pub trait Isolation: Send + Sync {
    /// Start a worker for the test described by `data`.
    ///
    /// Implementations that re-create the test elsewhere may drop `definition`.
    fn spawn(
        &self,
        data: &WorkerData,
        definition: TestDefinition,
    ) -> Result<Box<dyn SpawnedWorker>, CronometroError>;
}

/// A running worker.
pub trait SpawnedWorker {
    fn handle(&self) -> &WorkerHandle;

    /// Block until the worker reports or dies.
    ///
    /// `Err` means the isolation boundary failed, not the test.
    fn wait(self: Box<Self>) -> Result<TestResult, TestError>;
}

/// Runs every test on a dedicated thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadIsolation {
    stack_size: Option<usize>,
}

impl ThreadIsolation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack size for worker threads.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Isolation for ThreadIsolation {
    fn spawn(
        &self,
        data: &WorkerData,
        definition: TestDefinition,
    ) -> Result<Box<dyn SpawnedWorker>, CronometroError> {
        let (tx, rx) = mpsc::channel();
        let thread_name = format!("cronometro-worker-{}", data.index);

        let mut builder = thread::Builder::new().name(thread_name.clone());
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }

        let name = data.name.clone();
        let settings = data.settings;
        let join = builder.spawn(move || {
            let result = worker::measure(&name, definition, &settings);
            let _ = tx.send(WorkerMessage::Result(result));
        })?;

        Ok(Box::new(ThreadWorker {
            handle: WorkerHandle {
                index: data.index,
                kind: WorkerKind::Thread { name: thread_name },
            },
            join,
            rx,
        }))
    }
}

struct ThreadWorker {
    handle: WorkerHandle,
    join: JoinHandle<()>,
    rx: Receiver<WorkerMessage>,
}

impl SpawnedWorker for ThreadWorker {
    fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    fn wait(self: Box<Self>) -> Result<TestResult, TestError> {
        let ThreadWorker { join, rx, .. } = *self;
        let joined = join.join();

        match rx.try_recv() {
            Ok(message) => message.into_outcome(),
            Err(_) => match joined {
                Err(payload) => Err(TestError::from_panic(payload)),
                Ok(()) => Err(TestError::new("worker exited without reporting a result")),
            },
        }
    }
}

/// Runs every test in a child process.
///
/// The child must call one of the crate's entry points with the same test
/// table as the parent; that is what happens when the current executable is
/// re-run with its original arguments.
#[derive(Debug, Clone)]
pub struct ProcessIsolation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ProcessIsolation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Re-execute the current binary with the current arguments.
    pub fn current_exe() -> Result<Self, CronometroError> {
        let program = std::env::current_exe()?;
        Ok(Self {
            program,
            args: std::env::args_os().skip(1).collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Isolation for ProcessIsolation {
    fn spawn(
        &self,
        data: &WorkerData,
        _definition: TestDefinition,
    ) -> Result<Box<dyn SpawnedWorker>, CronometroError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_DATA_ENV, data.encode()?)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        Ok(Box::new(ProcessWorker {
            handle: WorkerHandle {
                index: data.index,
                kind: WorkerKind::Process { pid: child.id() },
            },
            child,
        }))
    }
}

struct ProcessWorker {
    handle: WorkerHandle,
    child: Child,
}

impl SpawnedWorker for ProcessWorker {
    fn handle(&self) -> &WorkerHandle {
        &self.handle
    }

    fn wait(self: Box<Self>) -> Result<TestResult, TestError> {
        let ProcessWorker { handle, mut child } = *self;
        let mut message: Option<Result<WorkerMessage, CronometroError>> = None;

        if let Some(stdout) = child.stdout.take() {
            // Test output is arbitrary bytes; keep draining to EOF so the child
            // never dies on a closed pipe before its terminal message.
            for line in BufReader::new(stdout).split(b'\n') {
                let line = match line {
                    Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(index = handle.index, error = %e, "failed reading worker output");
                        break;
                    }
                };
                match WorkerMessage::decode(&line) {
                    Ok(None) => passthrough(&line),
                    decoded if message.is_none() => message = decoded.transpose(),
                    _ => warn!(index = handle.index, "ignoring extra worker message"),
                }
            }
        }

        let status = child.wait();
        match message {
            Some(Ok(message)) => message.into_outcome(),
            Some(Err(e)) => Err(TestError::from(&e)),
            None => {
                let reason = match status {
                    Ok(status) => format!("worker process exited with {} before reporting a result", status),
                    Err(e) => format!("failed to wait for worker process: {}", e),
                };
                Err(TestError::from(&CronometroError::WorkerCrashed(reason)))
            }
        }
    }
}

/// Forward a worker's own output line to our stdout.
fn passthrough(line: &str) {
    if line.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    let _ = writeln!(stdout, "{}", line);
}
