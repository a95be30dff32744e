//! Stable exit codes for parsegen CLI commands.

/// The run (or check) succeeded.
pub const OK: i32 = 0;
/// Invalid config or target, or an unrecoverable error during the run.
pub const ERROR: i32 = 1;
/// The attempt budget ran out (or `check` found the artifact failing).
pub const FAILED: i32 = 2;
