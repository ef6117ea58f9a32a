//! Pre-flight checks on the composed destination tree.
//!
//! Surfaces missing prerequisites before any protocol runs; the caller must
//! abort the whole run on a non-empty violation list.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::RunConfig;

/// A missing prerequisite found during the pre-flight check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Required path missing under the destination.
    MissingPath(PathBuf),
    /// Required executable not resolvable via configured tools or `PATH`.
    MissingTool(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingPath(path) => {
                write!(f, "required path {} is missing", path.display())
            }
            Violation::MissingTool(tool) => {
                write!(f, "required tool {} is not resolvable", tool)
            }
        }
    }
}

/// Fatal wrapper: the run must abort before any protocol executes.
#[derive(Debug, Error)]
#[error("sanity check failed with {} violation(s)", .violations.len())]
pub struct SanityError {
    pub violations: Vec<Violation>,
}

/// Verify required paths and tools. Empty result means the tree is sane.
pub fn check(destination: &Path, config: &RunConfig) -> Vec<Violation> {
    let mut violations = Vec::new();
    for rel in &config.required_paths {
        if !destination.join(rel).exists() {
            violations.push(Violation::MissingPath(PathBuf::from(rel)));
        }
    }
    for tool in &config.required_tools {
        if !tool_resolves(tool, &config.tools) {
            violations.push(Violation::MissingTool(tool.clone()));
        }
    }
    violations
}

/// A tool resolves when it is an explicit executable path, the target of a
/// configured tool entry, or an executable on the current `PATH`.
fn tool_resolves(tool: &str, tools: &BTreeMap<String, String>) -> bool {
    if tool.contains('/') {
        return is_executable(Path::new(tool));
    }
    if tools.values().any(|configured| {
        let path = Path::new(configured);
        path.file_name().is_some_and(|name| name == tool) && is_executable(path)
    }) {
        return true;
    }
    find_in_path(tool).is_some()
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
