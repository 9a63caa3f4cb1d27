//! Process exit codes
//!
//! Argument errors are reported by clap with its own code (2).

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Manifest error - input could not be decoded
pub const MANIFEST_ERROR: i32 = 3;

/// Connection error - cluster unreachable, credentials or kubeconfig invalid
pub const CONNECTION_ERROR: i32 = 4;

/// Partial failure - some documents or sources failed
pub const PARTIAL_FAILURE: i32 = 5;

/// Interrupted by Ctrl-C or the --timeout deadline
pub const INTERRUPTED: i32 = 130;
