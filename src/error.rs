//! Definition of the library's error and result types.

use std::io;
use std::path::PathBuf;

/// The library's error enum. Every failure maps to one of these kinds and
/// is never swallowed; the single log-only condition in the crate is the
/// runtime mmap-version mismatch warning.
#[derive(Debug, thiserror::Error)]
pub enum SpatialIndexError {
    /// An invalid argument was passed (shape mismatch, mis-sized array,
    /// bad slice bounds, non-power-of-two rank grid).
    #[error("an invalid argument was passed: {0}")]
    InvalidArgument(String),

    /// An identifier component exceeds its reserved bit width.
    #[error("identifier out of range: {0}")]
    OutOfRange(String),

    /// An IO error occurred.
    #[error("an IO error occurred: {0}")]
    Storage(#[from] io::Error),

    /// A file contains corrupted data (bad magic, truncated payload,
    /// malformed meta-data).
    #[error("index data at {path:?} is corrupted: {reason}")]
    CorruptIndex {
        /// The offending file.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The index was written with an unsupported structure version.
    #[error("structure version mismatch: found {found}, supported {supported}")]
    VersionMismatch {
        /// The version found in the file.
        found: u16,
        /// The version this build supports.
        supported: u16,
    },

    /// A lazily loaded subtree file is missing from the index directory.
    #[error("subtree file is missing: {0:?}")]
    MissingSubtree(PathBuf),

    /// The host process requested cancellation.
    #[error("the operation was cancelled")]
    Cancelled,

    /// An invariant broke inside the library.
    #[error("an internal error occurred: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SpatialIndexError {
    fn from(error: serde_json::Error) -> SpatialIndexError {
        SpatialIndexError::Storage(io::Error::from(error))
    }
}

/// The library's result alias.
pub type Result<T> = std::result::Result<T, SpatialIndexError>;
