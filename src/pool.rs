//! Process-wide free list of idle arenas, so short-lived callers can reuse
//! an already-grown block chain instead of paying for fresh host
//! allocations on every request.

use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::arena::Arena;
use crate::DEFAULT_BLOCK_SIZE;

/// Configuration for the arena pool: how many idle arenas
/// [`return_to_pool`] retains before it starts dropping them. The standard
/// block size is not pool-wide configuration; it is supplied per call to
/// [`acquire`], since different callers of the same pool may legitimately
/// want different block sizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArenaOptions {
    /// Maximum number of idle arenas the pool retains. `None` means
    /// unbounded: a returned arena is always pooled rather than dropped.
    pub pool_capacity: Option<usize>,
}

static POOL: Lazy<Mutex<Vec<Arena>>> = Lazy::new(|| Mutex::new(Vec::new()));

/// `usize::MAX` stands in for "unbounded" so the hot path (`return_to_pool`)
/// is a single atomic load, no branch on an `Option`.
static POOL_CAPACITY: AtomicUsize = AtomicUsize::new(usize::MAX);

/// Applies pool-wide configuration: future [`return_to_pool`] calls honor
/// the new capacity. Does not affect arenas already idle in the pool.
pub fn configure(options: ArenaOptions) {
    let cap = options.pool_capacity.unwrap_or(usize::MAX);
    POOL_CAPACITY.store(cap, Ordering::Relaxed);
    log::debug!("pool: capacity set to {}", if cap == usize::MAX { "unbounded".to_string() } else { cap.to_string() });
}

/// Hands out an activated arena: either one popped from the pool (already
/// reset and ready for reuse) or a freshly constructed one, in both cases
/// active with the given standard-block size. `block_size == 0` selects
/// [`DEFAULT_BLOCK_SIZE`].
pub fn acquire(block_size: usize) -> Arena {
    let pooled = POOL.lock().pop();
    match pooled {
        Some(arena) => {
            log::trace!("pool: reusing idle arena, {} pooled remain", POOL.lock().len());
            // A pooled arena already has a first block, so `activate` only
            // records the requested block_size here; it does not resize
            // the blocks retained from the arena's prior epoch.
            arena
                .activate(block_size)
                .expect("activating an already-activated arena cannot fail");
            arena
        }
        None => {
            log::trace!("pool: empty, constructing a fresh arena");
            let arena = Arena::fresh();
            arena
                .activate(block_size)
                .expect("activating a fresh arena cannot fail");
            arena
        }
    }
}

/// Resets `arena` and returns it to the pool for reuse, unless the pool is
/// already at capacity (see [`ArenaOptions::pool_capacity`] /
/// [`configure`]), in which case it is dropped (freeing its blocks back to
/// the host allocator).
pub fn return_to_pool(arena: Arena) {
    arena.reset();
    let mut pool = POOL.lock();
    let cap = POOL_CAPACITY.load(Ordering::Relaxed);
    if pool.len() < cap {
        pool.push(arena);
        log::trace!("pool: returned arena, {} now pooled", pool.len());
    } else {
        log::trace!("pool: at capacity ({cap}), dropping returned arena");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The pool is a process-wide static; serialize tests that touch it so
    // they don't observe each other's in-flight mutations.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn acquire_without_a_pool_constructs_a_fresh_arena() {
        let _guard = TEST_LOCK.lock();
        configure(ArenaOptions::default());
        POOL.lock().clear();
        let a = acquire(4096);
        assert_eq!(a.block_size(), 4096);
    }

    #[test]
    fn returned_arenas_are_reset_before_reuse() {
        let _guard = TEST_LOCK.lock();
        configure(ArenaOptions::default());
        POOL.lock().clear();
        let a = acquire(4096);
        let ptr = unsafe { crate::typed::new_object::<i64>(&a) }.unwrap();
        let _ = ptr;
        assert!(a.allocated_bytes() > 0);
        return_to_pool(a);

        let b = acquire(4096);
        assert_eq!(b.allocated_bytes(), 0);
        return_to_pool(b);
    }

    #[test]
    fn configured_capacity_bounds_how_many_idle_arenas_are_retained() {
        let _guard = TEST_LOCK.lock();
        configure(ArenaOptions {
            pool_capacity: Some(4),
        });
        POOL.lock().clear();

        let returned: Vec<Arena> = (0..12).map(|_| acquire(64)).collect();
        for arena in returned {
            return_to_pool(arena);
        }
        assert_eq!(POOL.lock().len(), 4);

        configure(ArenaOptions::default());
    }
}
