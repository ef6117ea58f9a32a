//! Aggregation and rendering of run results.
//!
//! The report keeps per-protocol detail (exit code, log paths, duration) for
//! drill-down, not just aggregate counts, and is both printed as text and
//! persisted as JSON under the destination.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::executor::ExecutionResult;
use crate::exit_codes;
use crate::outcome::Outcome;
use crate::protocol::Protocol;

/// File name of the persisted report under the destination tree.
pub const REPORT_FILE: &str = "report.json";

/// Per-protocol entry in the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolRecord {
    pub name: String,
    pub root: String,
    /// `None` when the protocol was never launched (run cancelled first).
    pub outcome: Option<Outcome>,
    pub exit_code: Option<i32>,
    pub stdout_log: Option<String>,
    pub stderr_log: Option<String>,
    pub duration_secs: Option<f64>,
}

impl ProtocolRecord {
    pub fn completed(protocol: &Protocol, result: &ExecutionResult) -> Self {
        Self {
            name: protocol.name.clone(),
            root: protocol.root.display().to_string(),
            outcome: Some(result.outcome.clone()),
            exit_code: result.exit_code,
            stdout_log: Some(result.stdout_path.display().to_string()),
            stderr_log: Some(result.stderr_path.display().to_string()),
            duration_secs: Some(result.duration_secs),
        }
    }

    /// A protocol that was selected but never launched.
    pub fn not_run(protocol: &Protocol) -> Self {
        Self {
            name: protocol.name.clone(),
            root: protocol.root.display().to_string(),
            outcome: None,
            exit_code: None,
            stdout_log: None,
            stderr_log: None,
            duration_secs: None,
        }
    }
}

/// Counts per outcome class.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub success: usize,
    pub mismatch: usize,
    pub execution_error: usize,
    pub reporting_error: usize,
    pub not_run: usize,
}

impl Tally {
    fn count(records: &[ProtocolRecord]) -> Self {
        let mut tally = Tally {
            total: records.len(),
            ..Tally::default()
        };
        for record in records {
            match &record.outcome {
                None => tally.not_run += 1,
                Some(Outcome::Success) => tally.success += 1,
                Some(Outcome::Mismatch { .. }) => tally.mismatch += 1,
                Some(Outcome::ExecutionError { .. }) => tally.execution_error += 1,
                Some(Outcome::ReportingError { .. }) => tally.reporting_error += 1,
            }
        }
        tally
    }
}

/// Full report: the tally plus per-protocol drill-down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub tally: Tally,
    /// Subtree discovery failures; the affected protocols never ran.
    pub discovery_errors: Vec<String>,
    pub records: Vec<ProtocolRecord>,
}

impl Report {
    pub fn new(
        records: Vec<ProtocolRecord>,
        discovery_errors: Vec<String>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        let duration = finished_at - started_at;
        Self {
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            tally: Tally::count(&records),
            discovery_errors,
            records,
        }
    }

    /// Overall process exit code for this run.
    pub fn exit_code(&self) -> i32 {
        let engine_failures = self.tally.execution_error
            + self.tally.reporting_error
            + self.tally.not_run
            + self.discovery_errors.len();
        if engine_failures > 0 {
            exit_codes::PROTOCOL
        } else if self.tally.mismatch > 0 {
            exit_codes::MISMATCH
        } else {
            exit_codes::OK
        }
    }

    /// Serialize to pretty-printed JSON with trailing newline.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("serialize report")?;
        fs::write(path, format!("{contents}\n"))
            .with_context(|| format!("write report {}", path.display()))?;
        Ok(())
    }

    /// Render the human-readable summary.
    ///
    /// One status line per protocol, stderr excerpts for everything that ran
    /// and did not succeed, then the tally. Always renderable, including
    /// after cancellation.
    pub fn render_text(&self, excerpt_limit_bytes: usize) -> String {
        let mut out = String::new();
        for record in &self.records {
            let _ = writeln!(out, "{} {}", record.name, status_tag(record.outcome.as_ref()));
        }

        for record in &self.records {
            let failed = matches!(
                record.outcome,
                Some(Outcome::Mismatch { .. })
                    | Some(Outcome::ExecutionError { .. })
                    | Some(Outcome::ReportingError { .. })
            );
            if !failed {
                continue;
            }
            let _ = writeln!(out, "### {} stderr", record.name);
            match record
                .stderr_log
                .as_deref()
                .and_then(|path| tail_of_file(Path::new(path), excerpt_limit_bytes))
            {
                Some(excerpt) if !excerpt.trim().is_empty() => {
                    out.push_str(&excerpt);
                    if !excerpt.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {
                    let _ = writeln!(out, "(no stderr captured)");
                }
            }
        }

        for error in &self.discovery_errors {
            let _ = writeln!(out, "discovery error: {error}");
        }

        if self.tally.total == 0 {
            let _ = writeln!(out, "no protocols selected");
        }
        let ran = self.tally.total - self.tally.not_run;
        let _ = writeln!(
            out,
            "{} of {} selected protocols ran, {} did not run",
            ran, self.tally.total, self.tally.not_run
        );
        let _ = writeln!(
            out,
            "report: total={} success={} mismatch={} execution_error={} reporting_error={} not_run={}",
            self.tally.total,
            self.tally.success,
            self.tally.mismatch,
            self.tally.execution_error,
            self.tally.reporting_error,
            self.tally.not_run
        );
        out
    }
}

fn status_tag(outcome: Option<&Outcome>) -> &'static str {
    match outcome {
        None => "[NOT RUN]",
        Some(Outcome::Success) => "[SUCCESS]",
        Some(Outcome::Mismatch { .. }) => "[MISMATCH]",
        Some(Outcome::ExecutionError { .. }) => "[ERROR]",
        Some(Outcome::ReportingError { .. }) => "[UNREPORTED]",
    }
}

/// Read at most the last `limit` bytes of a file, lossily decoded.
fn tail_of_file(path: &Path, limit: usize) -> Option<String> {
    let contents = fs::read(path).ok()?;
    let start = contents.len().saturating_sub(limit);
    Some(String::from_utf8_lossy(&contents[start..]).to_string())
}
