//! Error Taxonomy
//!
//! Every fallible operation in the crate returns [`StoreResult`]. The variants
//! mirror the failure classes the contract distinguishes:
//!
//! - `Config`: invalid construction-time configuration, rejected before any
//!   connection attempt.
//! - `Connection`: the backend cannot be reached. Fatal to initialization and
//!   always surfaced; the engine never falls back to another backend.
//! - `NotNumeric`: a numeric operation (increment, hash-field increment) was
//!   applied to a value that does not parse as an integer.
//! - `Codec`: a value could not be serialized or deserialized.
//! - `Backend`: a driver-level failure from the active adapter.
//! - `Transaction`: an operation inside a batch failed; the batch was aborted
//!   and the triggering error is carried as the source.
//!
//! Not-found conditions are never errors. They come back as `None`, `false`,
//! or empty collections from the operation itself.

use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid configuration, detected before connecting.
    #[error("invalid configuration: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// The backend could not be reached.
    #[error("connection error: {message}")]
    Connection {
        /// Driver-reported reason
        message: String,
    },

    /// A numeric operation hit a value that is not an integer.
    #[error("value at {target} is not an integer")]
    NotNumeric {
        /// Key (or key.field) holding the offending value
        target: String,
    },

    /// A value failed to encode or decode.
    #[error("codec error: {message}")]
    Codec {
        /// What failed to round-trip
        message: String,
    },

    /// A driver-level failure from the active backend.
    #[error("backend error: {message}")]
    Backend {
        /// Driver-reported reason
        message: String,
    },

    /// An operation inside a transaction batch failed; the batch was aborted.
    #[error("transaction aborted at operation {index}: {source}")]
    Transaction {
        /// Zero-based index of the failing operation in the batch
        index: usize,
        /// The error raised by that operation
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a type error for a numeric operation.
    pub fn not_numeric(target: impl Into<String>) -> Self {
        Self::NotNumeric {
            target: target.into(),
        }
    }

    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Wrap an error that aborted a transaction batch.
    pub fn transaction(index: usize, source: StoreError) -> Self {
        Self::Transaction {
            index,
            source: Box::new(source),
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = StoreError::not_numeric("points");
        assert!(matches!(err, StoreError::NotNumeric { target } if target == "points"));

        let err = StoreError::config("bad prefix");
        assert!(matches!(err, StoreError::Config { message } if message == "bad prefix"));
    }

    #[test]
    fn test_transaction_wrapping_keeps_source() {
        let inner = StoreError::not_numeric("h.name");
        let err = StoreError::transaction(1, inner);
        match err {
            StoreError::Transaction { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, StoreError::NotNumeric { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_display_messages() {
        let err = StoreError::transaction(2, StoreError::backend("boom"));
        assert_eq!(
            err.to_string(),
            "transaction aborted at operation 2: backend error: boom"
        );
    }
}
