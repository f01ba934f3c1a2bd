//! Keep-alive anchors: anchoring an externally-owned value whose interior
//! address has been embedded in arena memory.
//!
//! Arena bytes are never scanned by a host's tracing collector (see
//! `raw`'s module docs), so when code embeds a reference to a host-managed
//! object (another arena, an external string, a closure) inside arena
//! bytes, the embedded reference is invisible to that collector. The value
//! is reachable only through arena memory, which does not count as
//! reachable from the collector's point of view, so without keep-alive it
//! could be reclaimed out from under the arena.
//!
//! Rust's `std` has no tracing collector to anchor against, so this is
//! reinterpreted as explicit ownership transfer, the way an
//! ownership-strict target naturally would: `keep_alive` takes *ownership*
//! of (or, for raw pointers, a non-owning handle to) the value, so it lives
//! at least as long as the arena that anchored it.

use std::any::Any;
use std::ptr::NonNull;

use crate::error::ArenaError;

/// An arbitrary owned value kept alive as a "mapping" kind (a lookup
/// structure such as a `HashMap`).
pub struct RawMapping(pub Box<dyn Any + Send>);

/// An owned closure kept alive as a "callable" kind.
pub struct RawCallable(pub Box<dyn FnMut() + Send>);

/// A sequence's backing data pointer, to be anchored on behalf of a
/// sequence that lives in a *different* arena.
pub struct SequencePtr(pub NonNull<u8>);

/// A string's backing data pointer, to be anchored on behalf of a string
/// that lives in a *different* arena.
pub struct StringPtr(pub NonNull<u8>);

/// A value anchored by [`crate::arena::Arena::keep_alive`], already
/// classified into one of the five recognized kinds.
pub enum Anchored {
    /// A raw pointer kind: the caller vouches that its target outlives the
    /// arena some other way (e.g. it is itself arena- or leak-owned); this
    /// arena only remembers the address.
    RawPtr(NonNull<u8>),
    /// A sequence kind (see [`SequencePtr`]).
    SequenceData(NonNull<u8>),
    /// A string kind (see [`StringPtr`]).
    StringData(NonNull<u8>),
    /// A mapping kind (see [`RawMapping`]).
    Mapping(Box<dyn Any + Send>),
    /// A callable kind (see [`RawCallable`]).
    Callable(Box<dyn FnMut() + Send>),
}

impl Anchored {
    /// Attempts to classify an arbitrary boxed value into one of the five
    /// recognized kinds by its runtime type. Values not wrapped in one of
    /// [`SequencePtr`], [`StringPtr`], [`RawMapping`], [`RawCallable`], or
    /// `NonNull<u8>` fail with [`ArenaError::UnsupportedKind`].
    ///
    /// Concrete call sites should prefer `Arena`'s typed `keep_alive_*`
    /// convenience methods over this dynamic entry point; it exists for
    /// hosts that only have an `Any`-erased value in hand and need to
    /// classify it at runtime.
    pub fn classify(x: Box<dyn Any + Send>) -> Result<Anchored, ArenaError> {
        let x = match x.downcast::<NonNull<u8>>() {
            Ok(ptr) => return Ok(Anchored::RawPtr(*ptr)),
            Err(x) => x,
        };
        let x = match x.downcast::<SequencePtr>() {
            Ok(d) => return Ok(Anchored::SequenceData(d.0)),
            Err(x) => x,
        };
        let x = match x.downcast::<StringPtr>() {
            Ok(d) => return Ok(Anchored::StringData(d.0)),
            Err(x) => x,
        };
        let x = match x.downcast::<RawMapping>() {
            Ok(d) => return Ok(Anchored::Mapping(d.0)),
            Err(x) => x,
        };
        match x.downcast::<RawCallable>() {
            Ok(d) => Ok(Anchored::Callable(d.0)),
            Err(_) => Err(ArenaError::UnsupportedKind),
        }
    }
}
