//! Error taxonomy for benchmark runs.
//!
//! Backend calls and file plumbing use `anyhow::Result` internally; the
//! runner converts them into [`BenchError`] at phase boundaries so that a
//! failed run can report *what kind* of failure stopped it.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Convenience alias for results carrying a [`BenchError`].
pub type Result<T, E = BenchError> = std::result::Result<T, E>;

/// Everything that can stop a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// The collection did not exist right after it was created.
    #[error("collection '{collection}' missing after create")]
    SetupInvariantViolation { collection: String },

    /// The backend row count after flush differs from what was inserted.
    #[error("row count mismatch after flush: expected {expected}, backend reports {actual}")]
    ConsistencyInvariantViolation { expected: u64, actual: u64 },

    /// The fixture files ran out before the requested rows were read.
    #[error("fixtures exhausted: requested {requested} vectors, only {available} available")]
    FixtureExhausted { requested: usize, available: usize },

    /// A fixture file could not be decoded or has the wrong row width.
    #[error("bad fixture file {}: {reason}", path.display())]
    FixtureFormatError { path: PathBuf, reason: String },

    /// The collection did not reach the loaded state in time.
    #[error("collection '{collection}' not loaded after {waited:?}")]
    LoadTimeout { collection: String, waited: Duration },

    /// Invalid configuration, detected before the run starts.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Any failure surfaced by the database client.
    #[error("backend error: {0:#}")]
    Backend(#[source] anyhow::Error),
}

/// Fieldless mirror of [`BenchError`] variants, cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SetupInvariantViolation,
    ConsistencyInvariantViolation,
    FixtureExhausted,
    FixtureFormatError,
    LoadTimeout,
    Config,
    Backend,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SetupInvariantViolation => "setup-invariant-violation",
            ErrorKind::ConsistencyInvariantViolation => "consistency-invariant-violation",
            ErrorKind::FixtureExhausted => "fixture-exhausted",
            ErrorKind::FixtureFormatError => "fixture-format-error",
            ErrorKind::LoadTimeout => "load-timeout",
            ErrorKind::Config => "config",
            ErrorKind::Backend => "backend",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl BenchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BenchError::SetupInvariantViolation { .. } => ErrorKind::SetupInvariantViolation,
            BenchError::ConsistencyInvariantViolation { .. } => {
                ErrorKind::ConsistencyInvariantViolation
            }
            BenchError::FixtureExhausted { .. } => ErrorKind::FixtureExhausted,
            BenchError::FixtureFormatError { .. } => ErrorKind::FixtureFormatError,
            BenchError::LoadTimeout { .. } => ErrorKind::LoadTimeout,
            BenchError::Config(_) => ErrorKind::Config,
            BenchError::Backend(_) => ErrorKind::Backend,
        }
    }

    /// Wrap a client failure.
    pub fn backend(err: anyhow::Error) -> Self {
        BenchError::Backend(err)
    }

    pub(crate) fn fixture_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BenchError::FixtureFormatError {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        BenchError::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = BenchError::ConsistencyInvariantViolation {
            expected: 10,
            actual: 9,
        };
        assert_eq!(err.kind(), ErrorKind::ConsistencyInvariantViolation);
        assert_eq!(
            BenchError::backend(anyhow::anyhow!("boom")).kind(),
            ErrorKind::Backend
        );
        assert_eq!(BenchError::config("x").kind(), ErrorKind::Config);
    }

    #[test]
    fn test_backend_message_keeps_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("POST /v2/vectordb/entities/insert");
        let msg = BenchError::backend(cause).to_string();
        assert!(msg.contains("entities/insert"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_fixture_format_message() {
        let err = BenchError::fixture_format("/data/a.npy", "expected 128D rows, got 96D");
        assert_eq!(err.kind(), ErrorKind::FixtureFormatError);
        assert!(err.to_string().contains("/data/a.npy"));
    }
}
