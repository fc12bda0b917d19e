//! Test definitions and their calling conventions.
//!
//! A test body (and each `before`/`after` hook) is tagged once, at
//! registration, with how it signals completion:
//!
//! - [`Routine::sync`]: returning is completion. Errors and panics are caught
//!   and become the iteration error.
//! - [`Routine::callback`]: the body receives a [`Done`] and must invoke it,
//!   possibly later and from another thread. A panic raised by a callback body
//!   is *not* caught: it tears down the worker and surfaces as an isolation
//!   failure. A callback that never invokes `Done` (and never drops it) hangs
//!   its worker.
//! - [`Routine::future`] (feature `async`): the returned future is driven to
//!   completion; `Err` or a panic while polling is the iteration error.

use crate::error::TestError;
use std::sync::mpsc::{self, Receiver, Sender};

#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

pub(crate) type SyncFn = Box<dyn FnMut() -> anyhow::Result<()> + Send>;
pub(crate) type CallbackFn = Box<dyn FnMut(Done) + Send>;
#[cfg(feature = "async")]
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>>>>;
#[cfg(feature = "async")]
pub(crate) type AsyncFn = Box<dyn FnMut() -> BoxFuture + Send>;

/// A callable tagged with its calling convention.
pub enum Routine {
    Sync(SyncFn),
    Callback(CallbackFn),
    #[cfg(feature = "async")]
    Async(AsyncFn),
}

impl Routine {
    pub fn sync<F>(f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        Routine::Sync(Box::new(f))
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: FnMut(Done) + Send + 'static,
    {
        Routine::Callback(Box::new(f))
    }

    #[cfg(feature = "async")]
    pub fn future<F, Fut>(mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Routine::Async(Box::new(move || Box::pin(f())))
    }

    /// Name of the calling convention, for diagnostics.
    pub fn convention(&self) -> &'static str {
        match self {
            Routine::Sync(_) => "sync",
            Routine::Callback(_) => "callback",
            #[cfg(feature = "async")]
            Routine::Async(_) => "async",
        }
    }
}

impl std::fmt::Debug for Routine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Routine::{}", self.convention())
    }
}

/// Completion signal handed to callback-style routines.
///
/// Consumed on use, so a routine can complete at most once per call.
#[derive(Debug)]
pub struct Done {
    tx: Sender<Result<(), TestError>>,
}

impl Done {
    pub(crate) fn channel() -> (Done, Receiver<Result<(), TestError>>) {
        let (tx, rx) = mpsc::channel();
        (Done { tx }, rx)
    }

    /// Signal success.
    pub fn ok(self) {
        self.complete(Ok(()));
    }

    /// Signal failure.
    pub fn fail(self, error: impl std::fmt::Display) {
        let _ = self.tx.send(Err(TestError::new(error.to_string())));
    }

    /// Signal completion with an explicit outcome.
    pub fn complete(self, outcome: anyhow::Result<()>) {
        // The receiver is gone only if the worker already gave up on this call.
        let _ = self.tx.send(outcome.map_err(TestError::from));
    }
}

/// A test body plus optional setup and teardown hooks.
///
/// An empty definition is a no-op test.
#[derive(Debug, Default)]
pub struct TestDefinition {
    pub test: Option<Routine>,
    pub before: Option<Routine>,
    pub after: Option<Routine>,
}

impl TestDefinition {
    pub fn new(test: Routine) -> Self {
        Self {
            test: Some(test),
            before: None,
            after: None,
        }
    }

    /// Definition with no body and no hooks.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn before(mut self, hook: Routine) -> Self {
        self.before = Some(hook);
        self
    }

    pub fn after(mut self, hook: Routine) -> Self {
        self.after = Some(hook);
        self
    }
}

impl From<Routine> for TestDefinition {
    fn from(test: Routine) -> Self {
        TestDefinition::new(test)
    }
}

/// Ordered table of named tests.
#[derive(Debug, Default)]
pub struct Tests {
    entries: Vec<(String, TestDefinition)>,
}

impl Tests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a test, replacing any previous test with the same name in place.
    pub fn add(mut self, name: impl Into<String>, definition: impl Into<TestDefinition>) -> Self {
        self.insert(name, definition);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, definition: impl Into<TestDefinition>) {
        let name = name.into();
        let definition = definition.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = definition,
            None => self.entries.push((name, definition)),
        }
    }

    /// Shorthand for a synchronous test.
    pub fn sync<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut() -> anyhow::Result<()> + Send + 'static,
    {
        self.add(name, Routine::sync(f))
    }

    /// Shorthand for a callback-style test.
    pub fn callback<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut(Done) + Send + 'static,
    {
        self.add(name, Routine::callback(f))
    }

    /// Shorthand for a future-returning test.
    #[cfg(feature = "async")]
    pub fn future<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.add(name, Routine::future(f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Remove and return the entry at `index`, as a worker does to locate its test.
    pub fn take(&mut self, index: usize) -> Option<(String, TestDefinition)> {
        if index < self.entries.len() {
            Some(self.entries.remove(index))
        } else {
            None
        }
    }
}

impl IntoIterator for Tests {
    type Item = (String, TestDefinition);
    type IntoIter = std::vec::IntoIter<(String, TestDefinition)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
