//! # lms-shared
//!
//! Shared error envelope and result types for the kv-config workspace.
//!
//! Every boundary of the workspace (document loading, schema construction,
//! stack collapse) reports failures as an [`ErrorEnvelope`] so callers get a
//! stable code, a kind, and diagnostic metadata regardless of the source.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod errors;
pub mod result;

pub use errors::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata};
pub use result::{Result, ResultExt};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
