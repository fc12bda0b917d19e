//! Worker to orchestrator messages.
//!
//! Every worker sends exactly one terminal message. Over a process boundary
//! it travels as a single JSON line on the worker's stdout:
//!
//! ```text
//! {"type":"cronometro.result","payload":{"success":true,...}}
//! {"type":"cronometro.error","payload":{"message":"..."}}
//! ```
//!
//! Anything else the worker prints is not a message and is passed through.

use crate::error::{CronometroError, TestError};
use crate::result::TestResult;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Every encoded message starts with this.
pub const MESSAGE_PREFIX: &str = "{\"type\":\"cronometro.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum WorkerMessage {
    /// The test ran; its result may itself be a failure.
    #[serde(rename = "cronometro.result")]
    Result(TestResult),
    /// The worker could not produce a result (missing test, escaped panic).
    #[serde(rename = "cronometro.error")]
    Error(TestError),
}

impl WorkerMessage {
    pub fn encode(&self) -> Result<String, CronometroError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one output line. `Ok(None)` for lines that are not messages.
    pub fn decode(line: &str) -> Result<Option<Self>, CronometroError> {
        let line = line.trim();
        if !line.starts_with(MESSAGE_PREFIX) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(line)?))
    }

    /// Write as one line, preceded by a newline so it never shares a line
    /// with unterminated test output.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), CronometroError> {
        let encoded = self.encode()?;
        writeln!(out)
            .and_then(|_| writeln!(out, "{}", encoded))
            .and_then(|_| out.flush())
            .map_err(CronometroError::WorkerIo)?;
        Ok(())
    }

    /// Whether the worker should exit with a success code.
    pub fn is_success(&self) -> bool {
        matches!(self, WorkerMessage::Result(r) if r.success)
    }

    /// The result, or the isolation-level error.
    pub fn into_outcome(self) -> Result<TestResult, TestError> {
        match self {
            WorkerMessage::Result(result) => Ok(result),
            WorkerMessage::Error(error) => Err(error),
        }
    }
}
