//! End-to-end orchestration of a run.
//!
//! Coordinates staging, sanity checks, discovery, selection, the worker
//! pool, and report assembly. Setup failures surface as errors before any
//! protocol executes; per-protocol failures live in the report.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::config::RunConfig;
use crate::context::RunContext;
use crate::discover::discover;
use crate::executor::{CancelToken, execute};
use crate::overlay::{compose, overlay_into};
use crate::protocol::Protocol;
use crate::report::{ProtocolRecord, Report};
use crate::sanity::{self, SanityError};
use crate::select::{Selection, select};

/// Source trees and filters for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Base tree staged first.
    pub base: PathBuf,
    /// Overlays over the whole base tree, applied in order.
    pub overlays: Vec<PathBuf>,
    /// Overlays merged into `<destination>/inputs`.
    pub input_overlays: Vec<PathBuf>,
    /// Overlays merged into `<destination>/protocols`.
    pub protocol_overlays: Vec<PathBuf>,
    /// Substring motifs skipped while copying. `.git` is always skipped.
    pub ignore: Vec<String>,
    pub selection: Selection,
}

/// Stage the destination, then execute the selected protocols and report.
#[instrument(skip_all, fields(destination = %destination.display()))]
pub fn run(destination: &Path, request: &RunRequest, config: RunConfig) -> Result<Report> {
    let started_at = Utc::now();

    let mut ignore = vec![".git".to_string()];
    ignore.extend(request.ignore.iter().cloned());

    debug!("staging destination tree");
    let mut sources = vec![request.base.clone()];
    sources.extend(request.overlays.iter().cloned());
    compose(&sources, destination, &ignore).context("stage destination")?;

    let destination = destination
        .canonicalize()
        .with_context(|| format!("resolve {}", destination.display()))?;
    let ctx = RunContext::new(destination, config);

    if !request.input_overlays.is_empty() {
        overlay_into(&request.input_overlays, &ctx.inputs_dir, &ignore)
            .context("stage inputs")?;
    }
    if !request.protocol_overlays.is_empty() {
        overlay_into(&request.protocol_overlays, &ctx.protocols_dir, &ignore)
            .context("stage protocols")?;
    }

    debug!("running sanity checks");
    let violations = sanity::check(&ctx.destination, &ctx.config);
    if !violations.is_empty() {
        for violation in &violations {
            warn!(violation = %violation, "sanity violation");
        }
        return Err(SanityError { violations }.into());
    }

    debug!("discovering protocols");
    let discovery = discover(&ctx.protocols_dir, &ctx.config);
    for error in &discovery.errors {
        warn!(error = %error, "protocol subtree skipped");
    }
    let selected = select(discovery.protocols, &request.selection);
    info!(selected = selected.len(), "protocols selected");

    let cancel = CancelToken::new(run_timeout(&ctx.config));
    let records = execute_all(&ctx, &selected, &cancel)?;

    let finished_at = Utc::now();
    Ok(Report::new(
        records,
        discovery.errors.iter().map(ToString::to_string).collect(),
        started_at,
        finished_at,
    ))
}

fn run_timeout(config: &RunConfig) -> Option<Duration> {
    (config.run_timeout_secs > 0).then(|| Duration::from_secs(config.run_timeout_secs))
}

/// Execute the selected protocols with a bounded worker pool.
///
/// Workers claim indices from a shared counter and stop claiming once
/// cancellation is observed. One result slot per protocol, written exactly
/// once; protocols whose slot stays empty are reported as not run.
fn execute_all(
    ctx: &RunContext,
    protocols: &[Protocol],
    cancel: &CancelToken,
) -> Result<Vec<ProtocolRecord>> {
    let jobs = ctx.config.jobs.min(protocols.len().max(1));
    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<ProtocolRecord>>> = Mutex::new(vec![None; protocols.len()]);
    let first_err: Mutex<Option<anyhow::Error>> = Mutex::new(None);

    thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if let Ok(guard) = first_err.lock()
                        && guard.is_some()
                    {
                        return;
                    }
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    if idx >= protocols.len() {
                        return;
                    }
                    let protocol = &protocols[idx];
                    match execute(ctx, protocol, cancel) {
                        Ok(result) => {
                            let record = ProtocolRecord::completed(protocol, &result);
                            if let Ok(mut guard) = slots.lock() {
                                guard[idx] = Some(record);
                            }
                        }
                        Err(err) => {
                            if let Ok(mut guard) = first_err.lock()
                                && guard.is_none()
                            {
                                *guard = Some(err);
                            }
                            return;
                        }
                    }
                }
            });
        }
    });

    if let Some(err) = first_err.into_inner().unwrap_or_else(|e| e.into_inner()) {
        return Err(err);
    }

    let slots = slots.into_inner().unwrap_or_else(|e| e.into_inner());
    let records = slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| slot.unwrap_or_else(|| ProtocolRecord::not_run(&protocols[idx])))
        .collect();
    Ok(records)
}
