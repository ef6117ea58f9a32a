//! Environment injected into every protocol subprocess.

use std::collections::BTreeMap;

use crate::context::RunContext;
use crate::protocol::Protocol;

/// Absolute path to the composed shared inputs directory.
pub const ENV_INPUTS: &str = "AA_INPUTS";
/// Absolute path to the protocol's success-code file.
pub const ENV_SUCCESS_CODE: &str = "AA_SUCCESS_CODE";
/// Absolute path to the protocol's log directory.
pub const ENV_LOG_DIR: &str = "AA_LOG_DIR";

/// Build the variable map for one protocol, merged over the inherited
/// process environment at spawn time.
///
/// The inputs and tool entries are constant across the run; the success-code
/// and log-dir entries are recomputed per protocol.
pub fn protocol_env(ctx: &RunContext, protocol: &Protocol) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(
        ENV_INPUTS.to_string(),
        ctx.inputs_dir.display().to_string(),
    );
    env.insert(
        ENV_SUCCESS_CODE.to_string(),
        protocol.success_code_path.display().to_string(),
    );
    env.insert(
        ENV_LOG_DIR.to_string(),
        protocol.log_dir.display().to_string(),
    );
    for (key, value) in &ctx.config.tools {
        env.insert(key.clone(), value.clone());
    }
    env
}
