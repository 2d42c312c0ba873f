//! Error types for the Cairn core engine.

use crate::types::SegmentId;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Cairn core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Archive storage error.
    #[error("storage error: {0}")]
    Storage(#[from] cairn_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No archive holds the requested segment.
    #[error("segment not found: {id}")]
    SegmentNotFound {
        /// The segment id that was not found.
        id: SegmentId,
    },

    /// A segment entry is corrupted or invalid.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A persisted journal snapshot is corrupted or invalid.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// An internal invariant did not hold.
    ///
    /// Indicates a programming or configuration error, such as an entry
    /// larger than the archive capacity. The operation is aborted rather
    /// than retried.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant.
        message: String,
    },

    /// The store has been closed.
    #[error("segment store is closed")]
    StoreClosed,

    /// The operation has no implementation in this engine.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },

    /// Failure propagated from a concurrent load of the same segment.
    ///
    /// When several threads wait on one in-flight cache load, the loader's
    /// error is shared with every waiter through this variant. Use
    /// [`CoreError::root`] to classify the underlying failure.
    #[error("{0}")]
    Shared(Arc<CoreError>),
}

impl CoreError {
    /// Returns the underlying error, looking through [`CoreError::Shared`]
    /// wrappers added by concurrent cache loads.
    #[must_use]
    pub fn root(&self) -> &CoreError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invariant violation error.
    pub fn invariant_violation(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}
