//! Immutable per-invocation state shared by every component.

use std::path::PathBuf;

use crate::config::RunConfig;

/// Subdirectory of the destination holding the composed shared inputs.
pub const INPUTS_SUBDIR: &str = "inputs";
/// Subdirectory of the destination holding the composed protocol tree.
pub const PROTOCOLS_SUBDIR: &str = "protocols";

/// Process-wide state for one invocation.
///
/// Built once after the destination tree is staged, then passed by reference
/// to every downstream component. Nothing mutates it, and nothing mutates
/// the process environment on its behalf; per-protocol variables are built
/// fresh for each subprocess.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Composed destination tree, absolute.
    pub destination: PathBuf,
    /// Shared inputs directory under the destination.
    pub inputs_dir: PathBuf,
    /// Protocol tree under the destination.
    pub protocols_dir: PathBuf,
    pub config: RunConfig,
}

impl RunContext {
    pub fn new(destination: PathBuf, config: RunConfig) -> Self {
        let inputs_dir = destination.join(INPUTS_SUBDIR);
        let protocols_dir = destination.join(PROTOCOLS_SUBDIR);
        Self {
            destination,
            inputs_dir,
            protocols_dir,
            config,
        }
    }
}
