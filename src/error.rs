//! Error types.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use thiserror::Error;

/// Errors that abort a whole run or break the worker boundary.
#[derive(Debug, Error)]
pub enum CronometroError {
    #[error("The iterations option must be a positive number.")]
    InvalidIterations(i64),

    #[error("The errorThreshold option must be a number between 0 and 100.")]
    InvalidErrorThreshold(f64),

    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(#[from] serde_json::Error),

    #[error("Worker I/O error: {0}")]
    WorkerIo(#[source] std::io::Error),

    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("Histogram error: {0}")]
    Histogram(String),

    #[error("Invalid worker data: {0}")]
    InvalidWorkerData(String),

    #[error("Failed to write report: {0}")]
    Report(String),
}

/// A failure carried inside a [`TestResult`](crate::TestResult).
///
/// Plain data so it can cross the isolation boundary: only the message survives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestError {
    pub message: String,
}

impl TestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an error from a caught panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TestError {}

impl From<anyhow::Error> for TestError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<&CronometroError> for TestError {
    fn from(err: &CronometroError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_extract_message_from_str_panic() {
        let payload = std::panic::catch_unwind(|| panic!("FAILED")).unwrap_err();
        assert_eq!(TestError::from_panic(payload).message(), "FAILED");
    }

    #[test]
    fn should_extract_message_from_formatted_panic() {
        let code = 42;
        let payload = std::panic::catch_unwind(|| panic!("code {}", code)).unwrap_err();
        assert_eq!(TestError::from_panic(payload).message(), "code 42");
    }

    #[test]
    fn should_fall_back_when_payload_is_opaque() {
        let payload = std::panic::catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(TestError::from_panic(payload).message(), "Unknown panic");
    }

    #[test]
    fn should_keep_only_the_outer_message_of_anyhow_errors() {
        let err = anyhow::anyhow!("inner").context("outer");
        assert_eq!(TestError::from(err).message(), "outer");
    }

    #[test]
    fn should_report_validation_messages() {
        assert_eq!(
            CronometroError::InvalidIterations(-1).to_string(),
            "The iterations option must be a positive number."
        );
        assert_eq!(
            CronometroError::InvalidErrorThreshold(101.0).to_string(),
            "The errorThreshold option must be a number between 0 and 100."
        );
    }
}
