//! Error kinds for the arena API.
//!
//! These are named failure modes, not an exception hierarchy: every
//! variant indicates a programmer contract violation or an irrecoverable
//! host condition, never a retryable/soft error.

use thiserror::Error;

/// A failure from the arena API.
#[derive(Debug, Error)]
pub enum ArenaError {
    /// `new_sequence` was called with `len > cap`. The arena is left
    /// unchanged.
    #[error("new_sequence: len {len} exceeds cap {cap}")]
    CapOutOfRange {
        /// The requested length.
        len: usize,
        /// The requested capacity.
        cap: usize,
    },

    /// `append_bounded` was called when the sequence would exceed its
    /// capacity.
    #[error("append_bounded: would grow length to {attempted}, exceeding capacity {cap}")]
    OutOfBounds {
        /// The length the append would have produced.
        attempted: usize,
        /// The sequence's current capacity.
        cap: usize,
    },

    /// `keep_alive` was called with a value whose runtime kind is not one
    /// of the five recognized kinds (raw pointer, sequence, string,
    /// mapping, callable).
    #[error("keep_alive: unsupported value kind")]
    UnsupportedKind,

    /// The host allocator could not satisfy a block or oversize-block
    /// request. The arena's prior state is preserved; no new block was
    /// appended.
    #[error("host allocator failed to satisfy a {requested}-byte block request")]
    HostAllocationFailure {
        /// The number of bytes that were requested from the host allocator.
        requested: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_the_offending_values() {
        let err = ArenaError::CapOutOfRange { len: 5, cap: 3 };
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains('3'));

        let err = ArenaError::OutOfBounds {
            attempted: 4,
            cap: 3,
        };
        assert!(err.to_string().contains('4'));

        let err = ArenaError::HostAllocationFailure { requested: 4096 };
        assert!(err.to_string().contains("4096"));
    }
}
