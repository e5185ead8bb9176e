//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while building record bodies.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer could not grow to hold an append.
    #[error("allocation failure: could not reserve {requested} more bytes")]
    AllocationFailure {
        /// Number of additional bytes that were requested.
        requested: usize,
    },

    /// A body is too large for the 4-byte record length field.
    #[error("record body of {len} bytes exceeds the u32 length field")]
    LengthOverflow {
        /// Actual body length.
        len: usize,
    },
}
