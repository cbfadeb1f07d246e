//! Error types for `strata-core`.
//!
//! This module provides a unified error type for all engine operations.
//! Error codes follow the pattern `STRATA-XXX` for easy debugging, and each
//! variant maps onto the process exit code the CLI contract requires.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or querying an index.
#[derive(Error, Debug)]
pub enum Error {
    /// File could not be opened, mapped, or fully read (STRATA-001).
    #[error("[STRATA-001] IO error on '{path}': {source}")]
    Io {
        /// Path of the file that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Input file is structurally invalid (STRATA-002).
    ///
    /// Covers truncated records and out-of-domain field values such as a
    /// query kind outside `0..=3`.
    #[error("[STRATA-002] Format error: {0}")]
    Format(String),

    /// A timestamp range holds fewer points than the requested `k` (STRATA-003).
    #[error("[STRATA-003] Range holds {span} points, fewer than k = {k}")]
    InsufficientRange {
        /// Number of points inside the range.
        span: usize,
        /// Requested result count.
        k: usize,
    },

    /// Graph construction violated one of its invariants (STRATA-004).
    #[error("[STRATA-004] Build failure: {0}")]
    Build(String),

    /// Configuration value out of range or unparsable (STRATA-005).
    #[error("[STRATA-005] Configuration error: {0}")]
    Config(String),

    /// A query names a label the dataset never assigned (STRATA-006).
    #[error("[STRATA-006] Unknown label {label} (dataset max is {max})")]
    UnknownLabel {
        /// Label requested by the query.
        label: u32,
        /// Largest label present in the dataset.
        max: u32,
    },
}

impl Error {
    /// Returns the error code (e.g. "STRATA-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "STRATA-001",
            Self::Format(_) => "STRATA-002",
            Self::InsufficientRange { .. } => "STRATA-003",
            Self::Build(_) => "STRATA-004",
            Self::Config(_) => "STRATA-005",
            Self::UnknownLabel { .. } => "STRATA-006",
        }
    }

    /// Returns the process exit code for this error.
    ///
    /// 1 = usage/configuration, 2 = IO or malformed input, 3 = invariant
    /// violation.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 1,
            Self::Io { .. } | Self::Format(_) => 2,
            Self::InsufficientRange { .. } | Self::Build(_) | Self::UnknownLabel { .. } => 3,
        }
    }

    /// Wraps an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::Format("kind 7".into()).code(), "STRATA-002");
        assert_eq!(Error::InsufficientRange { span: 3, k: 100 }.code(), "STRATA-003");
        assert_eq!(
            Error::UnknownLabel { label: 9, max: 4 }.code(),
            "STRATA-006"
        );
    }

    #[test]
    fn test_exit_codes_match_contract() {
        assert_eq!(Error::Config("bad cutoff".into()).exit_code(), 1);
        assert_eq!(
            Error::io("/nope", std::io::Error::from(std::io::ErrorKind::NotFound)).exit_code(),
            2
        );
        assert_eq!(Error::Build("degree overflow".into()).exit_code(), 3);
    }

    #[test]
    fn test_display_includes_code_and_detail() {
        let err = Error::InsufficientRange { span: 12, k: 100 };
        let msg = err.to_string();
        assert!(msg.contains("STRATA-003"));
        assert!(msg.contains("12"));
        assert!(msg.contains("100"));
    }
}
