//! The arena itself: owns a chain of standard blocks plus a set of
//! oversize blocks, serves aligned allocations, and supports
//! reset/merge/keep-alive and sub-arenas.

use std::any::Any;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ptr::NonNull;

use crate::block::Block;
use crate::error::ArenaError;
use crate::keepalive::Anchored;
use crate::{round_up_to_word, DEFAULT_BLOCK_SIZE};

/// A bump-pointer region allocator.
///
/// Obtain one via [`crate::pool::acquire`] rather than constructing it
/// directly: a freshly constructed `Arena` has no backing blocks until
/// [`Arena::activate`] runs, which the pool does on your behalf.
///
/// All mutating methods take `&self`: a single arena is not thread-safe
/// (non-goal, see crate docs), and callers are expected to serialize
/// access, exactly as a single-threaded allocator would. Interior
/// mutability (`Cell`/`RefCell`) is what lets `new_object`/`new_sequence`
/// hand out independent references without the borrow checker seeing them
/// as aliasing a `&mut Arena`.
pub struct Arena {
    block_size: Cell<usize>,
    blocks: RefCell<Vec<Block>>,
    huge_blocks: RefCell<Vec<Block>>,
    /// Index of the current block. `-1` means "freshly pulled from the
    /// pool, never activated."
    bidx: Cell<isize>,
    raw_keepalive: RefCell<Vec<NonNull<u8>>>,
    sequence_keepalive: RefCell<Vec<NonNull<u8>>>,
    string_keepalive: RefCell<Vec<NonNull<u8>>>,
    mapping_keepalive: RefCell<Vec<Box<dyn Any + Send>>>,
    callable_keepalive: RefCell<Vec<Box<dyn FnMut() + Send>>>,
    sub_arenas: RefCell<Vec<Arena>>,
}

// SAFETY: an `Arena` exclusively owns every byte its blocks point at (no
// other `Arena` or thread holds an overlapping reference), so moving one to
// another thread (which is all the `Pool`'s mutex ever does) is sound.
// Concurrent *use* of one `Arena` from multiple threads is still undefined
// behavior; a single arena is not thread-safe, callers must serialize access.
unsafe impl Send for Arena {}

impl Arena {
    /// Constructs an arena with no backing blocks yet (`bidx == -1`). Used
    /// by the pool on a fresh allocation; real callers should go through
    /// [`crate::pool::acquire`].
    pub(crate) fn fresh() -> Arena {
        Arena {
            block_size: Cell::new(DEFAULT_BLOCK_SIZE),
            blocks: RefCell::new(Vec::new()),
            huge_blocks: RefCell::new(Vec::new()),
            bidx: Cell::new(-1),
            raw_keepalive: RefCell::new(Vec::new()),
            sequence_keepalive: RefCell::new(Vec::new()),
            string_keepalive: RefCell::new(Vec::new()),
            mapping_keepalive: RefCell::new(Vec::new()),
            callable_keepalive: RefCell::new(Vec::new()),
            sub_arenas: RefCell::new(Vec::new()),
        }
    }

    /// Sets the block size and, on first use, allocates the first standard
    /// block. `block_size == 0` substitutes [`DEFAULT_BLOCK_SIZE`].
    pub(crate) fn activate(&self, block_size: usize) -> Result<(), ArenaError> {
        let bs = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size
        };
        self.block_size.set(bs);
        if self.bidx.get() < 0 {
            let block = Block::new(bs)?;
            self.blocks.borrow_mut().push(block);
            self.bidx.set(0);
            log::trace!("arena: allocated first standard block ({bs} bytes)");
        }
        Ok(())
    }

    /// The arena's configured standard block size.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size.get()
    }

    #[inline]
    fn bidx_usize(&self) -> usize {
        let b = self.bidx.get();
        debug_assert!(b >= 0, "arena used before activation");
        b.max(0) as usize
    }

    /// Core allocation primitive. Returns `Ok(None)` for a zero-size
    /// request: a real `alloc` would otherwise hand back an address that
    /// aliases either the tail of the current block or the start of
    /// whichever block comes next, so zero-size requests get a null
    /// sentinel (`None`) instead.
    pub(crate) fn alloc_layout(&self, need: usize) -> Result<Option<NonNull<u8>>, ArenaError> {
        if need == 0 {
            return Ok(None);
        }
        let aligned = round_up_to_word(need);
        if aligned <= self.block_size.get() {
            Ok(Some(self.alloc_from_standard_blocks(aligned)?))
        } else {
            Ok(Some(self.alloc_oversize(aligned)?))
        }
    }

    fn alloc_from_standard_blocks(&self, aligned: usize) -> Result<NonNull<u8>, ArenaError> {
        {
            let blocks = self.blocks.borrow();
            let cur = &blocks[self.bidx_usize()];
            if cur.len() + aligned <= cur.cap() {
                let ptr = cur.tail();
                cur.set_len(cur.len() + aligned);
                return Ok(ptr);
            }
        }
        self.advance_block()?;
        let blocks = self.blocks.borrow();
        let cur = &blocks[self.bidx_usize()];
        debug_assert!(aligned <= cur.cap(), "a single allocation must fit in one standard block");
        let ptr = cur.tail();
        cur.set_len(cur.len() + aligned);
        Ok(ptr)
    }

    /// Advances to the next block: reusing a block retained from a prior
    /// epoch if one is already there, otherwise allocating a fresh one.
    fn advance_block(&self) -> Result<(), ArenaError> {
        let next_idx = self.bidx_usize() + 1;
        let mut blocks = self.blocks.borrow_mut();
        if next_idx < blocks.len() {
            log::trace!("arena: reusing retained block {next_idx}");
        } else {
            let bs = self.block_size.get();
            let block = Block::new(bs)?;
            blocks.push(block);
            log::trace!("arena: allocated new standard block {next_idx} ({bs} bytes)");
        }
        self.bidx.set(next_idx as isize);
        Ok(())
    }

    fn alloc_oversize(&self, aligned: usize) -> Result<NonNull<u8>, ArenaError> {
        let block = Block::new_full(aligned)?;
        let ptr = block.data();
        log::debug!("arena: allocated oversize block ({aligned} bytes)");
        self.huge_blocks.borrow_mut().push(block);
        Ok(ptr)
    }

    /// `true` if the allocation `[ptr, ptr+len_bytes)` is exactly the tail
    /// of the current block: the precondition [`crate::sequence::append_inplace`]
    /// needs to grow a sequence's buffer without copying.
    pub(crate) fn is_tail_allocation(&self, ptr: NonNull<u8>, len_bytes: usize) -> bool {
        let blocks = self.blocks.borrow();
        match blocks.get(self.bidx_usize()) {
            Some(cur) => {
                let expected_end = unsafe { ptr.as_ptr().add(len_bytes) };
                std::ptr::eq(expected_end, cur.tail().as_ptr())
            }
            None => false,
        }
    }

    /// Extends the current block's cursor by `extra` bytes in place,
    /// without touching any byte. Returns `false` (and does nothing) if
    /// the current block cannot accommodate the growth.
    pub(crate) fn extend_current_block(&self, extra: usize) -> bool {
        let blocks = self.blocks.borrow();
        match blocks.get(self.bidx_usize()) {
            Some(cur) if cur.len() + extra < cur.cap() => {
                cur.set_len(cur.len() + extra);
                true
            }
            _ => false,
        }
    }

    /// Rewinds the arena for reuse: zeroes and rewinds every standard
    /// block's cursor (the blocks themselves are retained across the
    /// reset for the next epoch to reuse, see DESIGN.md's Open Questions),
    /// discards all oversize blocks, clears every keep-alive set, and
    /// recursively resets then drops all sub-arenas.
    pub fn reset(&self) {
        {
            let blocks = self.blocks.borrow();
            for block in blocks.iter() {
                block.reset();
            }
            self.bidx.set(if blocks.is_empty() { -1 } else { 0 });
        }
        self.huge_blocks.borrow_mut().clear();
        self.raw_keepalive.borrow_mut().clear();
        self.sequence_keepalive.borrow_mut().clear();
        self.string_keepalive.borrow_mut().clear();
        self.mapping_keepalive.borrow_mut().clear();
        self.callable_keepalive.borrow_mut().clear();
        for sub in self.sub_arenas.borrow_mut().drain(..) {
            sub.reset();
            // `sub` drops here, freeing its (now-reset, still-retained)
            // blocks along with it; a reset sub-arena is not itself kept.
        }
        log::debug!("arena: reset");
    }

    /// Appends `src`'s populated standard blocks, all of its oversize
    /// blocks, and all of its keep-alive sets to this arena. Addresses
    /// previously returned from `src` remain valid: merge moves block
    /// ownership, it never copies bytes. `src` must not be used again until
    /// it has been reset; taking it by value enforces that, since the only
    /// way to keep a binding to it afterward is to have called `reset` on
    /// it first.
    pub fn merge(&self, mut src: Arena) -> &Arena {
        let src_bidx = src.bidx.get();
        if src_bidx < 0 {
            log::trace!("arena: merge of an unused source arena, nothing to move");
            return self;
        }
        debug_assert!(self.bidx.get() >= 0, "merge target must already be activated");

        let take_n = src_bidx as usize + 1;
        {
            let mut src_blocks = src.blocks.borrow_mut();
            let mut dst_blocks = self.blocks.borrow_mut();
            dst_blocks.extend(src_blocks.drain(0..take_n));
        }
        self.huge_blocks
            .borrow_mut()
            .extend(src.huge_blocks.borrow_mut().drain(..));
        self.raw_keepalive
            .borrow_mut()
            .extend(src.raw_keepalive.borrow_mut().drain(..));
        self.sequence_keepalive
            .borrow_mut()
            .extend(src.sequence_keepalive.borrow_mut().drain(..));
        self.string_keepalive
            .borrow_mut()
            .extend(src.string_keepalive.borrow_mut().drain(..));
        self.mapping_keepalive
            .borrow_mut()
            .extend(src.mapping_keepalive.borrow_mut().drain(..));
        self.callable_keepalive
            .borrow_mut()
            .extend(src.callable_keepalive.borrow_mut().drain(..));

        self.bidx.set(self.bidx.get() + src_bidx + 1);
        src.bidx.set(-1);
        log::debug!("arena: merged {take_n} block(s) from another arena");
        self
    }

    /// Adds `sub` as a sub-arena: its reset is driven by this arena's
    /// reset.
    pub fn add_sub(&self, sub: Arena) {
        self.sub_arenas.borrow_mut().push(sub);
    }

    /// The ordered sequence of this arena's sub-arenas.
    pub fn sub_arenas(&self) -> Ref<'_, Vec<Arena>> {
        self.sub_arenas.borrow()
    }

    /// Anchors an already-classified value so it outlives this arena (see
    /// the `keepalive` module docs). This is the typed, infallible entry
    /// point; prefer it over [`Arena::keep_alive_dyn`].
    pub fn keep_alive(&self, value: Anchored) {
        match value {
            Anchored::RawPtr(p) => self.raw_keepalive.borrow_mut().push(p),
            Anchored::SequenceData(p) => self.sequence_keepalive.borrow_mut().push(p),
            Anchored::StringData(p) => self.string_keepalive.borrow_mut().push(p),
            Anchored::Mapping(m) => self.mapping_keepalive.borrow_mut().push(m),
            Anchored::Callable(c) => self.callable_keepalive.borrow_mut().push(c),
        }
    }

    /// Dynamically classifies `x` by its runtime kind and anchors it,
    /// failing with [`ArenaError::UnsupportedKind`] if it is none of the
    /// five recognized kinds. See [`crate::keepalive`] for the typed
    /// alternative most call sites should use instead.
    pub fn keep_alive_dyn(&self, value: Box<dyn Any + Send>) -> Result<(), ArenaError> {
        let anchored = Anchored::classify(value)?;
        self.keep_alive(anchored);
        Ok(())
    }

    /// Convenience: anchor a raw pointer kind.
    pub fn keep_alive_ptr(&self, ptr: NonNull<u8>) {
        self.keep_alive(Anchored::RawPtr(ptr));
    }

    /// Convenience: anchor a sequence kind by its backing data pointer.
    pub fn keep_alive_sequence_data(&self, ptr: NonNull<u8>) {
        self.keep_alive(Anchored::SequenceData(ptr));
    }

    /// Convenience: anchor a string kind by its backing data pointer.
    pub fn keep_alive_string_data(&self, ptr: NonNull<u8>) {
        self.keep_alive(Anchored::StringData(ptr));
    }

    /// Convenience: anchor a mapping kind by taking ownership of it.
    pub fn keep_alive_mapping<M: Any + Send>(&self, mapping: M) {
        self.keep_alive(Anchored::Mapping(Box::new(mapping)));
    }

    /// Convenience: anchor a callable kind by taking ownership of it.
    pub fn keep_alive_callable<F: FnMut() + Send + 'static>(&self, f: F) {
        self.keep_alive(Anchored::Callable(Box::new(f)));
    }

    /// Total bytes currently handed out across all standard and oversize
    /// blocks. Useful for tests and for a host that wants to watch memory
    /// pressure.
    pub fn allocated_bytes(&self) -> usize {
        let standard: usize = self.blocks.borrow().iter().map(Block::len).sum();
        let huge: usize = self.huge_blocks.borrow().iter().map(Block::len).sum();
        standard + huge
    }
}

impl fmt::Debug for Arena {
    /// A structural summary: block/sub-arena counts, not a full byte
    /// dump of every block's contents.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("block_size", &self.block_size.get())
            .field("bidx", &self.bidx.get())
            .field("blocks", &self.blocks.borrow().len())
            .field("huge_blocks", &self.huge_blocks.borrow().len())
            .field("sub_arenas", &self.sub_arenas.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activated(block_size: usize) -> Arena {
        let a = Arena::fresh();
        a.activate(block_size).unwrap();
        a
    }

    #[test]
    fn zero_size_alloc_returns_none() {
        let a = activated(256);
        assert!(a.alloc_layout(0).unwrap().is_none());
    }

    #[test]
    fn allocations_are_word_aligned_and_distinct() {
        let a = activated(256);
        let p1 = a.alloc_layout(3).unwrap().unwrap();
        let p2 = a.alloc_layout(5).unwrap().unwrap();
        assert_eq!(p1.as_ptr() as usize % crate::WORD, 0);
        assert_eq!(p2.as_ptr() as usize % crate::WORD, 0);
        assert_ne!(p1, p2);
    }

    #[test]
    fn oversize_allocation_gets_its_own_full_block() {
        let a = activated(64);
        let ptr = a.alloc_layout(4096).unwrap().unwrap();
        assert_eq!(a.huge_blocks.borrow().len(), 1);
        assert_eq!(a.huge_blocks.borrow()[0].data(), ptr);
        assert_eq!(a.huge_blocks.borrow()[0].len(), a.huge_blocks.borrow()[0].cap());
    }

    #[test]
    fn reset_zeroes_and_rewinds_but_keeps_blocks() {
        let a = activated(64);
        let p = a.alloc_layout(8).unwrap().unwrap();
        unsafe { std::ptr::write_bytes(p.as_ptr(), 0xAB, 8) };
        a.alloc_layout(4096).unwrap(); // an oversize block too
        assert_eq!(a.huge_blocks.borrow().len(), 1);

        a.reset();

        assert_eq!(a.bidx.get(), 0);
        assert!(a.huge_blocks.borrow().is_empty());
        let blocks = a.blocks.borrow();
        assert_eq!(blocks.len(), 1, "standard blocks are retained across reset");
        assert_eq!(blocks[0].len(), 0);
        unsafe {
            let byte = *blocks[0].data().as_ptr();
            assert_eq!(byte, 0);
        }
    }

    #[test]
    fn reset_is_idempotent() {
        let a = activated(64);
        a.alloc_layout(8).unwrap();
        a.reset();
        let blocks_after_one = a.blocks.borrow().len();
        a.reset();
        assert_eq!(a.blocks.borrow().len(), blocks_after_one);
        assert_eq!(a.bidx.get(), 0);
    }

    #[test]
    fn advancing_past_a_full_block_allocates_a_new_one() {
        let a = activated(32);
        // 32-byte block, each alloc rounds up to a word multiple; force a
        // few allocations that cannot all fit in one block.
        for _ in 0..8 {
            a.alloc_layout(16).unwrap();
        }
        assert!(a.blocks.borrow().len() > 1);
    }

    #[test]
    fn merge_moves_blocks_without_copying_and_preserves_addresses() {
        let parent = activated(256);
        let child = activated(256);
        let child_ptr = child.alloc_layout(8).unwrap().unwrap();
        unsafe { std::ptr::write_bytes(child_ptr.as_ptr(), 9, 8) };

        parent.merge(child);

        assert_eq!(parent.bidx.get(), 1);
        assert_eq!(parent.blocks.borrow().len(), 2);
        unsafe {
            let slice = std::slice::from_raw_parts(child_ptr.as_ptr(), 8);
            assert!(slice.iter().all(|&b| b == 9));
        }
    }

    #[test]
    fn merging_two_children_accumulates_blocks_and_bidx_on_the_parent() {
        let parent = activated(256);
        let first_child = activated(256);
        let second_child = activated(256);
        first_child.alloc_layout(8).unwrap();
        second_child.alloc_layout(8).unwrap();

        parent.merge(first_child);
        parent.merge(second_child);
        parent.alloc_layout(8).unwrap();

        assert_eq!(parent.bidx.get(), 2);
        assert_eq!(parent.blocks.borrow().len(), 3);
    }

    #[test]
    fn keep_alive_sets_are_cleared_on_reset() {
        let a = activated(64);
        a.keep_alive_mapping(std::collections::BTreeMap::from([(1, 2)]));
        assert_eq!(a.mapping_keepalive.borrow().len(), 1);
        a.reset();
        assert!(a.mapping_keepalive.borrow().is_empty());
    }

    #[test]
    fn sub_arenas_reset_recursively_and_are_dropped() {
        let parent = activated(64);
        let child = activated(64);
        child.alloc_layout(8).unwrap();
        parent.add_sub(child);
        assert_eq!(parent.sub_arenas().len(), 1);
        parent.reset();
        assert_eq!(parent.sub_arenas().len(), 0);
    }
}
