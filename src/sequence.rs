//! Resizable contiguous sequences living in arena memory, and their three
//! append families.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::arena::Arena;
use crate::error::ArenaError;
use crate::raw;
use crate::round_up_to_word;
use crate::sizeclass::round_up_to_size_class;

/// A resizable sequence of `T` backed by arena memory.
///
/// This is a *value*: growth that reallocates returns a new `Sequence`
/// rather than mutating one in place through a reference. `T` is
/// bounded by `Copy` because the arena never runs destructors on the bytes
/// it reclaims; a `Sequence` holding a type with a `Drop` impl would leak
/// or, worse, have that impl never run and its invariants silently
/// violated across a `reset`.
pub struct Sequence<T> {
    data: Option<NonNull<T>>,
    len: usize,
    cap: usize,
    /// The actual word-rounded byte footprint the arena committed for this
    /// buffer, not simply `cap * size_of::<T>()`, since the allocator
    /// rounds every request up to a word multiple. In-place growth must
    /// compare against this, not the raw element count, or it would
    /// either mistake a tail allocation for a non-tail one, or advance the
    /// block cursor by a non-word-aligned amount and break alignment for
    /// every allocation that follows.
    committed_bytes: usize,
}

// Safety note mirrors `Arena`: a `Sequence` is a plain value type handed to
// exactly one caller; it carries no shared mutable state of its own.
unsafe impl<T: Send> Send for Sequence<T> {}

impl<T: Copy> Sequence<T> {
    /// Constructs an empty, zero-capacity sequence (a null data pointer,
    /// to avoid aliasing two distinct zero-capacity sequences to the same
    /// address).
    pub(crate) fn empty() -> Sequence<T> {
        Sequence {
            data: None,
            len: 0,
            cap: 0,
            committed_bytes: 0,
        }
    }

    pub(crate) fn from_raw(data: NonNull<T>, len: usize, cap: usize) -> Sequence<T> {
        let committed_bytes = round_up_to_word(cap * std::mem::size_of::<T>());
        Sequence {
            data: Some(data),
            len,
            cap,
            committed_bytes,
        }
    }

    /// Number of initialized elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the sequence has no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total capacity of the backing buffer.
    #[inline]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// The backing data pointer, for anchoring via
    /// [`crate::arena::Arena::keep_alive_sequence_data`] from a *different*
    /// arena. `None` for an empty, zero-capacity sequence.
    pub fn data_ptr(&self) -> Option<NonNull<u8>> {
        self.data.map(|p| p.cast())
    }

    fn elem_size() -> usize {
        std::mem::size_of::<T>()
    }
}

impl<T: Copy> Deref for Sequence<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }
}

impl<T: Copy> DerefMut for Sequence<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        match self.data {
            Some(ptr) => unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }
}

fn alloc_buffer<T: Copy>(arena: &Arena, cap: usize) -> Result<Option<NonNull<T>>, ArenaError> {
    if cap == 0 {
        return Ok(None);
    }
    let bytes = cap
        .checked_mul(std::mem::size_of::<T>())
        .expect("sequence byte size overflowed usize");
    let ptr = arena.alloc_layout(bytes)?;
    Ok(ptr.map(NonNull::cast))
}

fn write_elems<T: Copy>(dst: NonNull<T>, offset: usize, elems: &[T]) {
    if elems.is_empty() {
        return;
    }
    let dst_bytes = NonNull::new(unsafe { dst.as_ptr().add(offset) as *mut u8 }).unwrap();
    let src_bytes = NonNull::new(elems.as_ptr() as *mut u8).unwrap();
    let len_bytes = elems.len() * std::mem::size_of::<T>();
    unsafe { raw::copy_no_scan(dst_bytes, src_bytes, len_bytes) };
}

/// **append (copy-growth).** Use this when the caller cannot be sure
/// `seq`'s buffer is the most recent arena allocation; the safe default.
///
/// If `elems` fits in the existing capacity, it is copied in at the tail.
/// Otherwise a fresh buffer sized by [`round_up_to_size_class`] is
/// allocated, the old contents copied over, then `elems` appended.
pub fn append<T: Copy>(
    arena: &Arena,
    seq: Sequence<T>,
    elems: &[T],
) -> Result<Sequence<T>, ArenaError> {
    if elems.is_empty() {
        return Ok(seq);
    }
    let new_len = seq.len + elems.len();
    if new_len <= seq.cap {
        let data = seq.data.expect("non-zero cap implies a backing pointer");
        write_elems(data, seq.len, elems);
        return Ok(Sequence {
            data: seq.data,
            len: new_len,
            cap: seq.cap,
            committed_bytes: seq.committed_bytes,
        });
    }
    copy_grow_and_append(arena, &seq, elems, new_len)
}

fn copy_grow_and_append<T: Copy>(
    arena: &Arena,
    seq: &Sequence<T>,
    elems: &[T],
    new_len: usize,
) -> Result<Sequence<T>, ArenaError> {
    let new_cap = round_up_to_size_class(seq.cap + elems.len()).max(new_len);
    let new_data = alloc_buffer::<T>(arena, new_cap)?.expect("new_cap > 0 here");
    if seq.len > 0 {
        let old_data = seq.data.expect("len > 0 implies a backing pointer");
        write_elems(new_data, 0, unsafe {
            std::slice::from_raw_parts(old_data.as_ptr(), seq.len)
        });
    }
    write_elems(new_data, seq.len, elems);
    log::trace!(
        "sequence: copy-grew from cap {} to {} ({} new elem(s))",
        seq.cap,
        new_cap,
        elems.len()
    );
    Ok(Sequence {
        data: Some(new_data),
        len: new_len,
        cap: new_cap,
        committed_bytes: round_up_to_word(new_cap * Sequence::<T>::elem_size()),
    })
}

/// **append-in-place.** Use this only when the caller guarantees no
/// other arena allocation has happened since `seq`'s buffer was allocated
/// (i.e. its tail is still the arena's live cursor). Interleaving growth of
/// two sequences from the same arena must use [`append`] instead, or the
/// second sequence's bytes would be corrupted by the first's "in-place"
/// growth.
///
/// When growth is needed and the current block has room to extend the
/// cursor by the size-class's growth in bytes, the buffer is extended in
/// place with zero copying. Otherwise this falls back to copy-growth, the
/// same as [`append`].
pub fn append_inplace<T: Copy>(
    arena: &Arena,
    seq: Sequence<T>,
    elems: &[T],
) -> Result<Sequence<T>, ArenaError> {
    if elems.is_empty() {
        return Ok(seq);
    }
    let new_len = seq.len + elems.len();
    if new_len <= seq.cap {
        let data = seq.data.expect("non-zero cap implies a backing pointer");
        write_elems(data, seq.len, elems);
        return Ok(Sequence {
            data: seq.data,
            len: new_len,
            cap: seq.cap,
            committed_bytes: seq.committed_bytes,
        });
    }

    let new_cap = round_up_to_size_class(seq.cap + elems.len()).max(new_len);
    let new_committed_bytes = round_up_to_word(new_cap * Sequence::<T>::elem_size());
    let growth_bytes = new_committed_bytes - seq.committed_bytes;

    if let Some(data) = seq.data {
        let data_bytes = data.cast::<u8>();
        if arena.is_tail_allocation(data_bytes, seq.committed_bytes)
            && arena.extend_current_block(growth_bytes)
        {
            write_elems(data, seq.len, elems);
            log::trace!(
                "sequence: grew in place from cap {} to {} ({} new elem(s))",
                seq.cap,
                new_cap,
                elems.len()
            );
            return Ok(Sequence {
                data: seq.data,
                len: new_len,
                cap: new_cap,
                committed_bytes: new_committed_bytes,
            });
        }
    }

    log::trace!("sequence: in-place growth unavailable, falling back to copy-growth");
    copy_grow_and_append(arena, &seq, elems, new_len)
}

/// **append-bounded.** A debugging/assertion variant that never
/// grows: fails with [`ArenaError::OutOfBounds`] if `seq` would need to
/// exceed its current capacity to hold one more element.
pub fn append_bounded<T: Copy>(seq: Sequence<T>, elem: T) -> Result<Sequence<T>, ArenaError> {
    if seq.len + 1 > seq.cap {
        return Err(ArenaError::OutOfBounds {
            attempted: seq.len + 1,
            cap: seq.cap,
        });
    }
    let data = seq.data.expect("non-zero cap implies a backing pointer");
    write_elems(data, seq.len, std::slice::from_ref(&elem));
    Ok(Sequence {
        data: seq.data,
        len: seq.len + 1,
        cap: seq.cap,
        committed_bytes: seq.committed_bytes,
    })
}
