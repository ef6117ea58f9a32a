//! Single-protocol execution with captured output.
//!
//! Each protocol script runs as a subprocess with its own working directory,
//! injected environment, and log directory. Stdout and stderr go straight to
//! files, so capture never blocks however much the script writes or however
//! it interleaves the two streams.

use std::fs::{self, File};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};
use wait_timeout::ChildExt;

use crate::context::RunContext;
use crate::environment::protocol_env;
use crate::outcome::{ExecutionErrorKind, Outcome, classify_success_code};
use crate::protocol::Protocol;

/// Captured stdout file name under the protocol log directory.
pub const STDOUT_LOG: &str = "stdout.log";
/// Captured stderr file name under the protocol log directory.
pub const STDERR_LOG: &str = "stderr.log";
/// File recording the script's exit code after the run.
pub const EXIT_CODE_FILE: &str = "EXIT_CODE";

/// Poll interval while waiting on the child; bounds cancellation latency.
const WAIT_TICK: Duration = Duration::from_millis(100);

/// Shared cancellation state: an explicit flag plus an optional run deadline.
///
/// Cloned into every worker; `cancel()` is the hook an interrupt handler
/// calls, the deadline implements the whole-run timeout.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new(run_timeout: Option<Duration>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: run_timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    /// Request cancellation of the whole run.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Everything recorded about one protocol execution. Never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub outcome: Outcome,
    pub exit_code: Option<i32>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub duration_secs: f64,
}

enum WaitEnd {
    Exited,
    Cancelled,
    TimedOut,
}

struct WaitOutcome {
    ended: WaitEnd,
    exit_code: Option<i32>,
}

/// Run one protocol to completion and classify the outcome.
///
/// Per-protocol failures (launch error, non-zero exit, contract violations,
/// cancellation) are captured in the returned record and never interrupt
/// sibling protocols. An `Err` means the engine itself could not prepare or
/// supervise the run.
#[instrument(skip_all, fields(protocol = %protocol.name))]
pub fn execute(
    ctx: &RunContext,
    protocol: &Protocol,
    cancel: &CancelToken,
) -> Result<ExecutionResult> {
    fs::create_dir_all(&protocol.log_dir)
        .with_context(|| format!("create log dir {}", protocol.log_dir.display()))?;

    let stdout_path = protocol.log_dir.join(STDOUT_LOG);
    let stderr_path = protocol.log_dir.join(STDERR_LOG);
    let stdout_file = File::create(&stdout_path)
        .with_context(|| format!("create {}", stdout_path.display()))?;
    let stderr_file = File::create(&stderr_path)
        .with_context(|| format!("create {}", stderr_path.display()))?;

    let started = Instant::now();
    let mut command = Command::new(&protocol.script);
    command
        .current_dir(&protocol.root)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout_file))
        .stderr(Stdio::from(stderr_file));
    for (key, value) in &protocol_env(ctx, protocol) {
        command.env(key, value);
    }

    debug!(script = %protocol.script.display(), "spawning protocol script");
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(err = %err, "protocol failed to launch");
            return Ok(ExecutionResult {
                outcome: Outcome::ExecutionError {
                    reason: ExecutionErrorKind::Spawn {
                        message: err.to_string(),
                    },
                },
                exit_code: None,
                stdout_path,
                stderr_path,
                duration_secs: started.elapsed().as_secs_f64(),
            });
        }
    };

    let timeout = Duration::from_secs(ctx.config.protocol_timeout_secs);
    let grace = Duration::from_secs(ctx.config.grace_period_secs);
    let wait = wait_with_cancel(&mut child, timeout, cancel, grace)?;
    let duration_secs = started.elapsed().as_secs_f64();

    if let Some(code) = wait.exit_code {
        let exit_code_path = protocol.log_dir.join(EXIT_CODE_FILE);
        fs::write(&exit_code_path, format!("{code}\n"))
            .with_context(|| format!("write {}", exit_code_path.display()))?;
    }

    let outcome = match wait.ended {
        WaitEnd::Cancelled => Outcome::ExecutionError {
            reason: ExecutionErrorKind::Cancelled,
        },
        WaitEnd::TimedOut => Outcome::ExecutionError {
            reason: ExecutionErrorKind::TimedOut,
        },
        WaitEnd::Exited => match wait.exit_code {
            Some(0) => classify_success_code(&protocol.success_code_path),
            code => Outcome::ExecutionError {
                reason: ExecutionErrorKind::NonZeroExit { exit_code: code },
            },
        },
    };

    info!(
        outcome = ?outcome,
        exit_code = ?wait.exit_code,
        duration_secs,
        "protocol finished"
    );
    Ok(ExecutionResult {
        outcome,
        exit_code: wait.exit_code,
        stdout_path,
        stderr_path,
        duration_secs,
    })
}

/// Wait for the child in short ticks so cancellation and the per-protocol
/// timeout are observed promptly.
fn wait_with_cancel(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
    grace: Duration,
) -> Result<WaitOutcome> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.wait_timeout(WAIT_TICK).context("wait for protocol")? {
            return Ok(WaitOutcome {
                ended: WaitEnd::Exited,
                exit_code: status.code(),
            });
        }
        if cancel.is_cancelled() {
            warn!("run cancelled, terminating protocol");
            let exit_code = terminate(child, grace)?;
            return Ok(WaitOutcome {
                ended: WaitEnd::Cancelled,
                exit_code,
            });
        }
        if Instant::now() >= deadline {
            warn!(timeout_secs = timeout.as_secs(), "protocol timed out");
            let exit_code = terminate(child, grace)?;
            return Ok(WaitOutcome {
                ended: WaitEnd::TimedOut,
                exit_code,
            });
        }
    }
}

/// Ask the child to terminate, escalating to a hard kill after `grace`.
fn terminate(child: &mut Child, grace: Duration) -> Result<Option<i32>> {
    request_termination(child);
    if let Some(status) = child
        .wait_timeout(grace)
        .context("wait for terminating protocol")?
    {
        return Ok(status.code());
    }
    child.kill().ok();
    let status = child.wait().context("wait after kill")?;
    Ok(status.code())
}

#[cfg(unix)]
fn request_termination(child: &Child) {
    // SIGTERM first, so shell traps and cleanup handlers get to run.
    let _ = Command::new("kill")
        .arg(child.id().to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn request_termination(_child: &Child) {}
