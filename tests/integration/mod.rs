//! Integration test framework for kvcheck
//!
//! Builds database images on disk, opens snapshots over them and runs
//! checks end to end.

use kvcheck::check::{self, CheckOptions, Finding, FindingKind};
use kvcheck::common::test_utils::{init_test_logging, ImageBuilder, TempDir, Utf8KeyValueStringer};
use kvcheck::common::{Error, Result};
use kvcheck::storage::page_io::write_image_sync;
use kvcheck::storage::tx::{OpenOptions, Tx};
use std::path::{Path, PathBuf};

/// Integration test environment
pub struct TestEnvironment {
    /// Temporary directory for test files
    pub temp_dir: TempDir,
    /// Database path within temp directory
    pub db_path: PathBuf,
}

impl TestEnvironment {
    /// Create a new test environment
    pub fn new() -> Result<Self> {
        init_test_logging();

        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.file_path("test.db");

        Ok(Self { temp_dir, db_path })
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get the temp directory path
    #[allow(dead_code)]
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write an image to the database path and map a snapshot over it
    pub fn open(&self, builder: &ImageBuilder) -> Result<Tx> {
        write_image_sync(&self.db_path, &builder.build())?;
        Tx::open_file(&self.db_path, &OpenOptions::new())
    }
}

/// Runs checks and summarises their findings
pub struct CheckHarness;

impl CheckHarness {
    /// Check options rendering keys as UTF-8
    pub fn options() -> CheckOptions {
        CheckOptions::new().stringer(Utf8KeyValueStringer)
    }

    /// Run a streamed check to completion
    pub fn run(tx: &Tx) -> Result<Vec<Finding>> {
        check::collect(tx, Self::options())
    }

    /// Run a check over an in-memory image built by `builder`
    pub fn run_image(builder: &ImageBuilder) -> Vec<Finding> {
        let tx = Tx::from_bytes(builder.build()).expect("image should open");
        Self::run(&tx).expect("check should finish")
    }

    /// Kinds of `findings`, in order
    pub fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
        findings.iter().map(Finding::kind).collect()
    }

    /// Findings of one kind
    #[allow(dead_code)]
    pub fn of_kind(findings: &[Finding], kind: FindingKind) -> Vec<&Finding> {
        findings.iter().filter(|f| f.kind() == kind).collect()
    }
}

/// Helper for testing error conditions
pub struct ErrorTester;

impl ErrorTester {
    /// Test that a function returns a specific error type
    pub fn assert_error_type<T: std::fmt::Debug, F>(func: F, expected_predicate: fn(&Error) -> bool)
    where
        F: FnOnce() -> Result<T>,
    {
        let result = func();
        assert!(result.is_err(), "Expected error, got success");

        let error = result.unwrap_err();
        assert!(expected_predicate(&error), "Error type mismatch. Got: {error:?}");
    }

    /// Test that a function returns a corruption error
    pub fn assert_corruption_error<T: std::fmt::Debug, F>(func: F)
    where
        F: FnOnce() -> Result<T>,
    {
        Self::assert_error_type(func, Error::is_corruption);
    }

    /// Test that a function returns an IO error
    #[allow(dead_code)]
    pub fn assert_io_error<T: std::fmt::Debug, F>(func: F)
    where
        F: FnOnce() -> Result<T>,
    {
        Self::assert_error_type(func, Error::is_io);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_creation() {
        let env = TestEnvironment::new().expect("Should create test environment");

        assert!(env.temp_path().is_dir());
        assert_eq!(env.db_path().file_name().unwrap(), "test.db");
    }

    #[test]
    fn test_open_writes_image() {
        let env = TestEnvironment::new().expect("Should create test environment");
        let tx = env.open(&ImageBuilder::new()).expect("Should open image");

        assert!(env.db_path().exists());
        assert_eq!(tx.meta().pgid, 2);
    }

    #[test]
    fn test_error_tester() {
        ErrorTester::assert_io_error(|| -> Result<()> { Err(Error::io("Test IO error")) });
        ErrorTester::assert_corruption_error(|| -> Result<()> { Err(Error::corruption("Test corruption")) });
    }
}
