//! Typed constructors built on top of [`crate::arena::Arena`]: single
//! objects, resizable sequences, immutable strings, and scalar boxed
//! values.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::arena::Arena;
use crate::error::ArenaError;
use crate::raw;
use crate::sequence::Sequence;

/// A mutable reference to a single `T` allocated from an arena.
///
/// Like [`Sequence`], this carries no lifetime tied to the arena: validity
/// past the arena's next reset/return-to-pool is the caller's
/// responsibility, not something this type statically prevents.
pub struct ArenaRef<T>(NonNull<T>);

impl<T> ArenaRef<T> {
    /// The raw pointer behind this reference, for anchoring via
    /// [`Arena::keep_alive_ptr`] from a different arena.
    pub fn as_ptr(&self) -> NonNull<T> {
        self.0
    }
}

impl<T> Deref for ArenaRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: points into live arena memory for a T-sized, T-aligned
        // slot that this handle uniquely represents.
        unsafe { self.0.as_ref() }
    }
}

impl<T> DerefMut for ArenaRef<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.0.as_mut() }
    }
}

/// An immutable string copied into arena memory.
///
/// Identity of the original source is not preserved; this is a fresh
/// copy, not a view into the caller's buffer.
pub struct ArenaString {
    data: Option<NonNull<u8>>,
    len: usize,
}

impl ArenaString {
    /// Views the string's bytes.
    pub fn as_str(&self) -> &str {
        match self.data {
            Some(ptr) => unsafe {
                let bytes = std::slice::from_raw_parts(ptr.as_ptr(), self.len);
                std::str::from_utf8_unchecked(bytes)
            },
            None => "",
        }
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` for the empty string.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The backing data pointer, for anchoring via
    /// [`Arena::keep_alive_string_data`] from a different arena.
    pub fn data_ptr(&self) -> Option<NonNull<u8>> {
        self.data
    }
}

impl Deref for ArenaString {
    type Target = str;
    fn deref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for ArenaString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allocates `sizeof(T)` aligned bytes from `a` and interprets them as a
/// `T`, uninitialized. `T` must not need its memory zeroed or a destructor
/// run (the arena never zeroes on allocation and never drops its
/// contents), so callers generally use `T: Copy` plain-old-data types here.
///
/// # Safety
/// The returned reference points at uninitialized memory. The caller must
/// write a valid `T` to it (typically immediately, via `*obj = value`)
/// before reading any field.
pub unsafe fn new_object<T>(a: &Arena) -> Result<ArenaRef<T>, ArenaError> {
    let ptr = a.alloc_layout(std::mem::size_of::<T>())?;
    match ptr {
        Some(ptr) => Ok(ArenaRef(ptr.cast())),
        None => {
            // size_of::<T>() == 0: any well-aligned dangling pointer works.
            Ok(ArenaRef(NonNull::dangling()))
        }
    }
}

/// Allocates a sequence of `T` with `len` initialized-length and `cap`
/// capacity slots. Fails with [`ArenaError::CapOutOfRange`] if `len > cap`.
/// A `cap == 0` request returns an empty sequence with no backing
/// allocation.
///
/// The bytes are not zeroed. Callers that need zeroed memory must zero it
/// themselves; the arena never inspects or clears the content of bytes it
/// hands out.
pub fn new_sequence<T: Copy>(a: &Arena, len: usize, cap: usize) -> Result<Sequence<T>, ArenaError> {
    if len > cap {
        return Err(ArenaError::CapOutOfRange { len, cap });
    }
    if cap == 0 {
        return Ok(Sequence::empty());
    }
    let bytes = cap
        .checked_mul(std::mem::size_of::<T>())
        .expect("sequence byte size overflowed usize");
    let ptr = a
        .alloc_layout(bytes)?
        .expect("cap > 0 implies a non-zero byte request");
    Ok(Sequence::from_raw(ptr.cast(), len, cap))
}

/// Copies `src`'s bytes into a freshly allocated, arena-owned string. An
/// empty `src` allocates nothing and returns the empty string.
pub fn new_string(a: &Arena, src: &str) -> Result<ArenaString, ArenaError> {
    if src.is_empty() {
        return Ok(ArenaString { data: None, len: 0 });
    }
    let ptr = a
        .alloc_layout(src.len())?
        .expect("non-empty src implies a non-zero byte request");
    let src_ptr = NonNull::new(src.as_ptr() as *mut u8).expect("&str is never null");
    unsafe { raw::copy_no_scan(ptr, src_ptr, src.len()) };
    Ok(ArenaString {
        data: Some(ptr),
        len: src.len(),
    })
}

macro_rules! scalar_ctor {
    ($(#[$meta:meta])* $name:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $name(a: &Arena, value: $ty) -> Result<ArenaRef<$ty>, ArenaError> {
            // SAFETY: immediately initialized below before any read.
            let mut r = unsafe { new_object::<$ty>(a)? };
            *r = value;
            Ok(r)
        }
    };
}

scalar_ctor!(
    /// Allocates a `bool` scalar.
    new_bool, bool
);
scalar_ctor!(
    /// Allocates an `isize` scalar (the arena's native "int").
    new_int, isize
);
scalar_ctor!(
    /// Allocates an `i32` scalar.
    new_int32, i32
);
scalar_ctor!(
    /// Allocates a `u32` scalar.
    new_uint32, u32
);
scalar_ctor!(
    /// Allocates an `i64` scalar.
    new_int64, i64
);
scalar_ctor!(
    /// Allocates a `u64` scalar.
    new_uint64, u64
);
scalar_ctor!(
    /// Allocates an `f32` scalar.
    new_float32, f32
);
scalar_ctor!(
    /// Allocates an `f64` scalar.
    new_float64, f64
);

/// Allocates a mutable reference to an already arena-allocated
/// [`ArenaString`]'s header (a small fixed-size `(ptr, len)` pair), useful
/// when a string needs to be embedded by value inside a larger
/// arena-allocated object.
pub fn new_string_ref(a: &Arena, value: ArenaString) -> Result<ArenaRef<ArenaString>, ArenaError> {
    // SAFETY: immediately initialized below before any read.
    let mut r = unsafe { new_object::<ArenaString>(a)? };
    *r = value;
    Ok(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> Arena {
        let a = Arena::fresh();
        a.activate(4096).unwrap();
        a
    }

    #[test]
    fn new_object_roundtrips_a_value() {
        let a = arena();
        let mut r = unsafe { new_object::<i64>(&a).unwrap() };
        *r = 42;
        assert_eq!(*r, 42);
    }

    #[test]
    fn new_string_copies_bytes() {
        let a = arena();
        let s = new_string(&a, "hello").unwrap();
        assert_eq!(s.as_str(), "hello");
    }

    #[test]
    fn new_string_empty_allocates_nothing() {
        let a = arena();
        let s = new_string(&a, "").unwrap();
        assert!(s.is_empty());
        assert!(s.data_ptr().is_none());
    }

    #[test]
    fn new_sequence_zero_cap_has_no_backing_pointer() {
        let a = arena();
        let seq = new_sequence::<i32>(&a, 0, 0).unwrap();
        assert_eq!(seq.cap(), 0);
        assert!(seq.data_ptr().is_none());
    }

    #[test]
    fn new_sequence_honors_requested_len_and_cap() {
        let a = arena();
        let seq = new_sequence::<i32>(&a, 3, 4).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.cap(), 4);
    }

    #[test]
    fn new_sequence_rejects_len_greater_than_cap() {
        let a = arena();
        let err = new_sequence::<i32>(&a, 3, 1).unwrap_err();
        assert!(matches!(err, ArenaError::CapOutOfRange { len: 3, cap: 1 }));
    }

    macro_rules! scalar_test_impl {
        ($fn_name:ident, $ctor:ident, $ty:ty, $value:expr) => {
            #[test]
            fn $fn_name() {
                let a = arena();
                let r = $ctor(&a, $value).unwrap();
                assert_eq!(*r, $value);
            }
        };
    }

    scalar_test_impl!(new_bool_roundtrips, new_bool, bool, true);
    scalar_test_impl!(new_int32_roundtrips, new_int32, i32, -7);
    scalar_test_impl!(new_uint64_roundtrips, new_uint64, u64, 99);
    scalar_test_impl!(new_float64_roundtrips, new_float64, f64, 1.5);
}
