//! Recursive discovery of protocol units.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::config::RunConfig;
use crate::protocol::{DEFAULT_SCRIPT_NAMES, METADATA_FILE, Metadata, Protocol};

/// Failure while scanning part of a protocol tree. Fatal for the affected
/// subtree only; sibling subtrees keep their results.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("unreadable entry under {}: {source}", .root.display())]
    Unreadable {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("metadata {}: {message}", .path.display())]
    Metadata { path: PathBuf, message: String },
    #[error("protocol {}: script {} not found", .root.display(), .script.display())]
    ScriptMissing { root: PathBuf, script: PathBuf },
    #[error("protocol {}: metadata present but no entry point found", .root.display())]
    NoEntryPoint { root: PathBuf },
}

/// Everything one scan produced: resolved units plus per-subtree failures.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Sorted by root path, so repeated scans of an unmodified tree return
    /// the same sequence.
    pub protocols: Vec<Protocol>,
    pub errors: Vec<DiscoveryError>,
}

/// Walk `root` and resolve every protocol unit beneath it.
///
/// A directory qualifies when it directly contains a recognized entry point:
/// a `protocol.toml` naming a script, or one of the default script names.
/// Nesting depth is unbounded and matching does not stop at the first hit in
/// a subtree. Zero matches is a valid, empty result.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover(root: &Path, config: &RunConfig) -> Discovery {
    let mut discovery = Discovery::default();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                discovery.errors.push(DiscoveryError::Unreadable {
                    root: root.to_path_buf(),
                    source: err,
                });
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match resolve_unit(entry.path(), root, config) {
            Ok(Some(protocol)) => discovery.protocols.push(protocol),
            Ok(None) => {}
            Err(err) => discovery.errors.push(err),
        }
    }
    discovery.protocols.sort_by(|a, b| a.root.cmp(&b.root));
    debug!(
        count = discovery.protocols.len(),
        errors = discovery.errors.len(),
        "discovery complete"
    );
    discovery
}

/// Resolve one directory into a protocol, or `None` when it holds no
/// recognized entry point.
fn resolve_unit(
    dir: &Path,
    scan_root: &Path,
    config: &RunConfig,
) -> Result<Option<Protocol>, DiscoveryError> {
    let meta = Metadata::load(dir).map_err(|err| DiscoveryError::Metadata {
        path: dir.join(METADATA_FILE),
        message: format!("{err:#}"),
    })?;

    let script = match meta.as_ref().and_then(|m| m.script.as_deref()) {
        Some(script_rel) => {
            let script = dir.join(script_rel);
            if !script.is_file() {
                return Err(DiscoveryError::ScriptMissing {
                    root: dir.to_path_buf(),
                    script,
                });
            }
            script
        }
        None => match default_script(dir) {
            Some(script) => script,
            None if meta.is_some() => {
                return Err(DiscoveryError::NoEntryPoint {
                    root: dir.to_path_buf(),
                });
            }
            None => return Ok(None),
        },
    };

    let meta = meta.unwrap_or_default();
    let name = meta
        .name
        .clone()
        .unwrap_or_else(|| default_name(dir, scan_root));
    let log_dir = dir.join(meta.log_dir.as_deref().unwrap_or(&config.log_dir));
    let success_code_path = dir.join(
        meta.success_code_path
            .as_deref()
            .unwrap_or(&config.success_code_path),
    );

    Ok(Some(Protocol {
        root: dir.to_path_buf(),
        name,
        script,
        log_dir,
        success_code_path,
    }))
}

fn default_script(dir: &Path) -> Option<PathBuf> {
    DEFAULT_SCRIPT_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn default_name(dir: &Path, scan_root: &Path) -> String {
    match dir.strip_prefix(scan_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.display().to_string(),
        _ => dir.display().to_string(),
    }
}
