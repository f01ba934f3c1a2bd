//! A single fixed-capacity byte region plus a high-water cursor.
//!
//! Blocks are append-only within an epoch (between resets). They never grow
//! or shrink their own backing storage; all reuse is handled by the owning
//! [`crate::arena::Arena`].

use std::cell::Cell;
use std::ptr::NonNull;

use crate::error::ArenaError;
use crate::raw;

/// A fixed-capacity byte region with a bump cursor.
///
/// A block is *standard* if its capacity equals its arena's configured
/// block size; otherwise it is an *oversize* block allocated to satisfy a
/// single request larger than the arena's block size. `Block` itself does
/// not track which kind it is; `Arena` knows, from which list (`blocks` vs
/// `huge_blocks`) a block lives in.
pub(crate) struct Block {
    data: NonNull<u8>,
    cap: usize,
    len: Cell<usize>,
}

impl Block {
    /// Allocates a new block of exactly `cap` bytes from the host
    /// allocator. `cap` must be greater than zero.
    pub(crate) fn new(cap: usize) -> Result<Block, ArenaError> {
        let data = raw::alloc_region(cap)?;
        Ok(Block {
            data,
            cap,
            len: Cell::new(0),
        })
    }

    /// Marks an oversize block as fully consumed by its single allocation.
    pub(crate) fn new_full(cap: usize) -> Result<Block, ArenaError> {
        let block = Block::new(cap)?;
        block.len.set(cap);
        Ok(block)
    }

    #[inline]
    pub(crate) fn data(&self) -> NonNull<u8> {
        self.data
    }

    #[inline]
    pub(crate) fn cap(&self) -> usize {
        self.cap
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.get()
    }

    #[inline]
    pub(crate) fn set_len(&self, len: usize) {
        debug_assert!(len <= self.cap, "block cursor must not exceed capacity");
        self.len.set(len);
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.cap - self.len.get()
    }

    /// A pointer to the first unused byte of this block.
    #[inline]
    pub(crate) fn tail(&self) -> NonNull<u8> {
        // SAFETY: len <= cap always holds (block invariant).
        unsafe { NonNull::new_unchecked(self.data.as_ptr().add(self.len.get())) }
    }

    /// Zeroes the used prefix `[0, len)` and rewinds the cursor to zero, as
    /// part of `Arena::reset`.
    pub(crate) fn reset(&self) {
        let used = self.len.get();
        if used > 0 {
            // SAFETY: [data, data+used) is within this block's owned region.
            unsafe { raw::zero_no_scan(self.data, used) };
            self.len.set(0);
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: `data` was allocated by `raw::alloc_region(cap)` and this
        // is the sole owner of the region.
        unsafe { raw::dealloc_region(self.data, self.cap) };
    }
}
