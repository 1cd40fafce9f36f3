//! Error types for heap operations.
//!
//! Every failure is detected and reported at the boundary of the operation
//! that found it. None of them leave the block chain in a modified state.

use thiserror::Error;

/// The error type returned by fallible [`Heap`](crate::Heap) operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// No block, even after coalescing free neighbours, can hold the request.
    #[error("out of memory: no block can hold {requested} bytes")]
    OutOfMemory {
        /// Number of bytes requested by the caller.
        requested: usize,
    },

    /// The reference failed bounds or integrity-tag validation.
    #[error("invalid pointer at offset {offset}: {cause}")]
    InvalidReference {
        /// Payload offset the caller presented.
        offset: usize,
        /// Which check rejected it.
        cause: &'static str,
    },

    /// The block behind the reference is already free.
    #[error("double free detected at offset {offset}")]
    DoubleRelease {
        /// Payload offset the caller presented.
        offset: usize,
    },

    /// The arena has not been initialized yet.
    #[error("heap not initialized")]
    NotInitialized,

    /// A payload access would run past the end of the block.
    #[error("access of {len} bytes overflows a {capacity}-byte block")]
    Overflow {
        /// Number of bytes the caller tried to access.
        len: usize,
        /// Payload capacity of the block.
        capacity: usize,
    },

    /// The block chain itself violates one of its invariants.
    #[error("heap corruption detected at block offset {offset}: {cause}")]
    Corrupted {
        /// Header offset where the walk stopped.
        offset: usize,
        /// Which invariant failed.
        cause: &'static str,
    },
}

/// Returned when a strategy name is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown allocation strategy '{0}', expected 'first-fit' or 'best-fit'")]
pub struct ParseStrategyError(pub String);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            HeapError::OutOfMemory { requested: 16 }.to_string(),
            "out of memory: no block can hold 16 bytes"
        );
        assert_eq!(
            HeapError::DoubleRelease { offset: 40 }.to_string(),
            "double free detected at offset 40"
        );
        assert_eq!(
            ParseStrategyError("worst".into()).to_string(),
            "unknown allocation strategy 'worst', expected 'first-fit' or 'best-fit'"
        );
    }
}
