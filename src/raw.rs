//! Raw-memory primitives: obtaining a backing byte region from the host
//! allocator, zeroing a range, and copying a range.
//!
//! These are the arena's only point of contact with the host allocator.
//! In a host with a tracing garbage collector,
//! the zero/copy primitives here are expected to be the "no-scan" variants
//! that never trip a write barrier, because arena bytes are never
//! interpreted as object references by that collector (see the crate-level
//! docs and `keepalive`). `std::alloc`'s byte-level operations have no write
//! barriers to begin with, so that contract is satisfied automatically on
//! this target; the functions are still named and documented as such so a
//! port to a host with a real tracing collector knows exactly which calls
//! must stay barrier-free.

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};

use crate::error::ArenaError;

/// Allocates a byte region of exactly `cap` bytes, word-aligned, from the
/// host allocator. `cap` must be greater than zero.
pub(crate) fn alloc_region(cap: usize) -> Result<NonNull<u8>, ArenaError> {
    debug_assert!(cap > 0, "alloc_region requires a positive capacity");
    let layout = region_layout(cap);
    // SAFETY: layout has non-zero size, checked by `region_layout`.
    let ptr = unsafe { alloc::alloc(layout) };
    NonNull::new(ptr).ok_or(ArenaError::HostAllocationFailure { requested: cap })
}

/// Releases a byte region previously returned by [`alloc_region`] with the
/// same `cap`.
///
/// # Safety
/// `ptr` must have been returned by `alloc_region(cap)` and not already
/// freed.
pub(crate) unsafe fn dealloc_region(ptr: NonNull<u8>, cap: usize) {
    let layout = region_layout(cap);
    alloc::dealloc(ptr.as_ptr(), layout);
}

fn region_layout(cap: usize) -> Layout {
    // Blocks are always word-aligned so that every word-aligned allocation
    // handed out of them starts on a word boundary.
    Layout::from_size_align(cap, std::mem::align_of::<usize>())
        .expect("block capacity overflows isize")
}

/// Zeroes `len` bytes starting at `dst`.
///
/// No-scan: safe to call on arena memory because the arena's bytes are
/// never scanned by a host collector (see module docs).
///
/// # Safety
/// `dst` must be valid for writes of `len` bytes.
pub(crate) unsafe fn zero_no_scan(dst: NonNull<u8>, len: usize) {
    if len == 0 {
        return;
    }
    ptr::write_bytes(dst.as_ptr(), 0, len);
}

/// Copies `len` bytes from `src` to `dst`. The regions must not overlap.
///
/// No-scan: see module docs.
///
/// # Safety
/// `src` must be valid for reads of `len` bytes, `dst` valid for writes of
/// `len` bytes, and the two regions must not overlap.
pub(crate) unsafe fn copy_no_scan(dst: NonNull<u8>, src: NonNull<u8>, len: usize) {
    if len == 0 {
        return;
    }
    ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), len);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_dealloc_roundtrip() {
        let region = alloc_region(64).unwrap();
        unsafe {
            zero_no_scan(region, 64);
            dealloc_region(region, 64);
        }
    }

    #[test]
    fn zero_clears_bytes() {
        let region = alloc_region(16).unwrap();
        unsafe {
            ptr::write_bytes(region.as_ptr(), 0xAA, 16);
            zero_no_scan(region, 16);
            let slice = std::slice::from_raw_parts(region.as_ptr(), 16);
            assert!(slice.iter().all(|&b| b == 0));
            dealloc_region(region, 16);
        }
    }

    #[test]
    fn copy_moves_bytes() {
        let src = alloc_region(8).unwrap();
        let dst = alloc_region(8).unwrap();
        unsafe {
            ptr::write_bytes(src.as_ptr(), 7, 8);
            copy_no_scan(dst, src, 8);
            let slice = std::slice::from_raw_parts(dst.as_ptr(), 8);
            assert!(slice.iter().all(|&b| b == 7));
            dealloc_region(src, 8);
            dealloc_region(dst, 8);
        }
    }
}
