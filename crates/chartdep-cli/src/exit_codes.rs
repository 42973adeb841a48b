//! Exit codes for CLI operations
//!
//! Follows sysexits.h for usage errors.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// A dependency could not be resolved against the configured repositories
pub const RESOLVE_ERROR: i32 = 2;

/// An archive or index could not be downloaded
pub const FETCH_ERROR: i32 = 3;

/// A downloaded archive failed its digest check
pub const INTEGRITY_ERROR: i32 = 4;

/// The dependency directory could not be updated
pub const RECONCILE_ERROR: i32 = 5;

/// `requirements.lock` is missing or does not match `requirements.yaml`
pub const LOCK_ERROR: i32 = 6;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 74;

/// Usage error - invalid arguments, manifest or repository configuration
pub const USAGE_ERROR: i32 = 64;
