//! Stable exit codes for the protorun CLI.

/// Every selected protocol succeeded, or zero protocols were selected.
pub const OK: i32 = 0;
/// Setup failed before execution: composition, sanity check, or invalid usage.
pub const SETUP: i32 = 1;
/// Every failure was a domain mismatch (all protocols ran cleanly).
pub const MISMATCH: i32 = 2;
/// At least one protocol hit an execution or reporting error, or did not run.
pub const PROTOCOL: i32 = 3;
