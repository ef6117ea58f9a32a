//! Protocol units and their metadata.
//!
//! A protocol is one independent test: a directory with an executable entry
//! point and an optional `protocol.toml` carrying overrides. The engine
//! never inspects the script's content, only its observable contract.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Script names recognized as an entry point when metadata does not name one.
pub const DEFAULT_SCRIPT_NAMES: &[&str] = &["protocol.sh", "protocol", "run.sh"];

/// Name of the optional per-protocol metadata file.
pub const METADATA_FILE: &str = "protocol.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct MetadataFile {
    protocol: Metadata,
}

/// Optional per-protocol overrides, read from `protocol.toml`.
///
/// Unset keys fall back to the run configuration defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Metadata {
    /// Reporting label. Defaults to the root path relative to the scan root.
    pub name: Option<String>,
    /// Script entry point, relative to the protocol root.
    pub script: Option<String>,
    /// Log directory, relative to the protocol root.
    pub log_dir: Option<String>,
    /// Success-code file, relative to the protocol root.
    pub success_code_path: Option<String>,
}

impl Metadata {
    /// Load the metadata file from a protocol directory, if present.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(METADATA_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let file: MetadataFile =
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        Ok(Some(file.protocol))
    }
}

/// One discovered test unit with fully resolved paths. Immutable after
/// discovery; consumed once by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Protocol {
    /// Absolute protocol root; also the working directory for the script.
    pub root: PathBuf,
    /// Reporting label.
    pub name: String,
    /// Absolute script path; exists at discovery time.
    pub script: PathBuf,
    /// Absolute log directory.
    pub log_dir: PathBuf,
    /// Absolute success-code path.
    pub success_code_path: PathBuf,
}
