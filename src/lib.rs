//! kvcheck - structural consistency checker for copy-on-write B+tree files
//!
//! kvcheck opens a read-only snapshot of a single-file key/value store and
//! re-derives, from raw page bytes, the invariants the write path is meant
//! to keep:
//! - every page below the high-water mark is either reachable or free
//! - no physical page is referenced twice
//! - no reachable page is also free
//! - keys respect B+tree ordering relative to their ancestors' separators
//!
//! Defects are streamed as [`check::Finding`]s; an empty stream that
//! finishes cleanly means the snapshot is consistent.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

// Core modules
pub mod check;
pub mod common;
pub mod storage;

// Re-exports for convenience
pub use check::{check, check_into, check_with, collect, CheckOptions, CheckStream, Finding, FindingKind};
pub use common::{Error, Result};
pub use storage::tx::{OpenOptions, Tx};

/// Version information
pub const VERSION_MAJOR: u32 = 0;
/// Version information
pub const VERSION_MINOR: u32 = 1;
/// Version information
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
        assert_eq!(
            VERSION,
            format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_PATCH}")
        );
    }
}
