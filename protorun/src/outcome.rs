//! Per-protocol outcome classification.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Why a protocol counts as an execution error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The subprocess could not be launched.
    Spawn { message: String },
    /// The script exited non-zero, or died on a signal (`None`).
    NonZeroExit { exit_code: Option<i32> },
    /// The run was cancelled while the protocol was in flight.
    Cancelled,
    /// The protocol exceeded its wall-clock budget.
    TimedOut,
}

/// Classification of one executed protocol.
///
/// `Mismatch` is a legitimate test outcome, not an engine error: the script
/// honored its contract and reported a domain failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Exit 0 and a zero success code.
    Success,
    /// Exit 0, but the domain check reported a non-zero code.
    Mismatch { success_code: i64 },
    /// The script failed to run to a clean exit.
    ExecutionError { reason: ExecutionErrorKind },
    /// Exit 0, but the success-code contract was violated.
    ReportingError { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

/// Classify a clean exit by reading the success-code file.
///
/// A missing file or non-integer content is a contract violation by the
/// protocol, not an engine error.
pub fn classify_success_code(path: &Path) -> Outcome {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => {
            return Outcome::ReportingError {
                message: format!("success-code file {} was not written", path.display()),
            };
        }
    };
    match contents.trim().parse::<i64>() {
        Ok(0) => Outcome::Success,
        Ok(code) => Outcome::Mismatch { success_code: code },
        Err(_) => Outcome::ReportingError {
            message: format!(
                "success-code file {} is not an integer: {:?}",
                path.display(),
                contents.trim()
            ),
        },
    }
}
