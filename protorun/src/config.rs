//! Run configuration, optionally loaded from a TOML file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Run configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to conservative values; in particular
/// execution is sequential unless `jobs` is raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Number of protocols executed concurrently.
    pub jobs: usize,

    /// Per-protocol wall-clock budget in seconds.
    pub protocol_timeout_secs: u64,

    /// Whole-run wall-clock budget in seconds. Zero disables the deadline.
    pub run_timeout_secs: u64,

    /// Seconds between the termination signal and the hard kill.
    pub grace_period_secs: u64,

    /// Bytes of stderr quoted per failing protocol in the text summary.
    pub excerpt_limit_bytes: usize,

    /// Default log directory, relative to a protocol root.
    pub log_dir: String,

    /// Default success-code file, relative to a protocol root.
    ///
    /// Existing suites disagree on the conventional location
    /// (`LOGS/SUCCESS_CODE` vs `MY_LOGS/SUCCESS_CODE`), so the default is a
    /// configuration value and each protocol may override it in metadata.
    pub success_code_path: String,

    /// Relative paths that must exist in the destination before any
    /// protocol runs.
    pub required_paths: Vec<String>,

    /// Executables that must be resolvable before any protocol runs.
    pub required_tools: Vec<String>,

    /// Environment variables injected into every protocol subprocess,
    /// typically locations of wrapped simulation tools. Passed through
    /// unchanged.
    pub tools: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            protocol_timeout_secs: 60 * 60,
            run_timeout_secs: 0,
            grace_period_secs: 5,
            excerpt_limit_bytes: 50_000,
            log_dir: "LOGS".to_string(),
            success_code_path: "LOGS/SUCCESS_CODE".to_string(),
            required_paths: vec!["inputs".to_string(), "protocols".to_string()],
            required_tools: Vec::new(),
            tools: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config: RunConfig = toml::from_str(&contents)
            .with_context(|| format!("parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validate config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            bail!("jobs must be > 0");
        }
        if self.protocol_timeout_secs == 0 {
            bail!("protocol_timeout_secs must be > 0");
        }
        if self.log_dir.trim().is_empty() {
            bail!("log_dir must be non-empty");
        }
        if Path::new(&self.log_dir).is_absolute() {
            bail!("log_dir must be relative to the protocol root");
        }
        if self.success_code_path.trim().is_empty() {
            bail!("success_code_path must be non-empty");
        }
        if Path::new(&self.success_code_path).is_absolute() {
            bail!("success_code_path must be relative to the protocol root");
        }
        for key in self.tools.keys() {
            if key.trim().is_empty() {
                bail!("tools keys must be non-empty");
            }
        }
        Ok(())
    }
}
