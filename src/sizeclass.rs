//! Size-class rounding for sequence growth.
//!
//! `round_up_to_size_class` mirrors the shape of a general-purpose runtime's
//! sequence growth policy: a jump table of small classes (to avoid slack at
//! the sizes allocators actually see most), then geometric doubling above
//! the table. The exact values matter for performance parity with a given
//! host runtime but not for correctness: any caller only relies on
//! `round_up_to_size_class(n) >= n`.
//!
//! An earlier growth policy based on a configurable ratio (2.5, clamped to
//! a minimum of 16) predates this table and is superseded by it; the ratio
//! is not implemented here, only the size-class table it was replaced by.

/// Small-size jump table, in element counts. Chosen to give a handful of
/// cheap early classes before switching to doubling, the same shape as the
/// small-object classes used by general-purpose allocators.
const SMALL_CLASSES: &[usize] = &[
    1, 2, 4, 8, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024,
];

/// Rounds `n` up to the next size class. `round_up_to_size_class(0) == 0`.
///
/// Exposed publicly so callers that need to predict a sequence's capacity
/// after growth (for example, in tests) can use the same table the
/// allocator itself grows by.
pub fn round_up_to_size_class(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    if let Some(&class) = SMALL_CLASSES.iter().find(|&&c| c >= n) {
        return class;
    }
    let mut cap = *SMALL_CLASSES.last().expect("table is non-empty");
    while cap < n {
        cap = cap
            .checked_mul(2)
            .expect("sequence capacity overflowed usize while growing");
    }
    cap
}
