//! Stable exit codes for the automation binaries.

/// Command succeeded.
pub const OK: i32 = 0;
/// Usage, configuration, or validation failure (or a fatal batch error).
pub const INVALID: i32 = 1;
