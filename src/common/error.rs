//! Error handling for kvcheck
//!
//! These are faults of the page-access layer or of the caller. Structural
//! defects found by a check are not errors; they are reported as
//! [`Finding`](crate::check::Finding)s on the check stream.

use crate::storage::page_constants::PageId;
use thiserror::Error;

/// Common result type for kvcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kvcheck operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),
    /// The image cannot be decoded (bad meta, element outside its page, ...)
    #[error("Database corruption: {0}")]
    Corruption(String),
    /// Invalid input or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A page id does not resolve to bytes inside the image
    #[error("Page {page_id} out of range: image holds {page_count} pages")]
    PageOutOfRange {
        /// Requested page
        page_id: PageId,
        /// Number of whole pages in the image
        page_count: u64,
    },
    /// The consumer of a check stream went away
    #[error("Finding receiver disconnected")]
    Disconnected,
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl Error {
    /// Create an I/O error
    pub fn io<S: Into<String>>(msg: S) -> Self {
        Error::Io(msg.into())
    }

    /// Create a corruption error
    pub fn corruption<S: Into<String>>(msg: S) -> Self {
        Error::Corruption(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this is an I/O error
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this is a corruption error
    ///
    /// Unresolvable pages count as corruption: the image claims a page it
    /// does not contain.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::PageOutOfRange { .. })
    }

    /// Check if this is a recoverable error
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io(_) | Error::InvalidInput(_) | Error::Disconnected => true,
            Error::Corruption(_) | Error::PageOutOfRange { .. } | Error::Internal(_) => false,
        }
    }
}
