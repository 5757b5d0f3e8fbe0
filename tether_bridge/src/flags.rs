//! Capability classification.
//!
//! A guest value's capabilities are probed exactly once, when it first
//! crosses into the native runtime, and encoded as an immutable bitset. The
//! bitset is a pure function of the value's shape at classification time; it
//! is deliberately never re-derived, even if the guest value later mutates
//! its shape. That staleness matches the guest's own monomorphic view of the
//! value and keeps every proxy operation probe-free.

use bitflags::bitflags;
use tether_core::{GuestRef, GuestRuntime};

bitflags! {
    /// Independent facts about one guest value.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u16 {
        /// Carries an iterator constructor.
        const ITERABLE = 1 << 0;
        /// Is itself an iterator (advance-able).
        const ITERATOR = 1 << 1;
        /// Carries a `size` or `length` member.
        const LENGTH = 1 << 2;
        /// Carries a `get` method (keyed read).
        const GET_METHOD = 1 << 3;
        /// Carries a `set` method (keyed write; `delete` assumed alongside).
        const SET_METHOD = 1 << 4;
        /// Carries a `has` method (cheap containment).
        const HAS_METHOD = 1 << 5;
        /// Carries an `includes` method (linear containment).
        const INCLUDES_METHOD = 1 << 6;
        /// Is promise-like (then-able after normalization).
        const PROMISE = 1 << 7;
        /// Is a typed contiguous buffer.
        const TYPED_BUFFER = 1 << 8;
        /// Is callable.
        const FUNCTION = 1 << 9;
        /// Is an indexed array (integer subscripts, not keyed methods).
        const ARRAY = 1 << 10;
    }
}

impl Capabilities {
    /// Integer encoding used as the subtype-cache key.
    #[inline]
    pub fn encode(self) -> u16 {
        self.bits()
    }
}

/// Probe one guest value and produce its capability bitset.
///
/// One handle-table query per bit; no iteration, no allocation. There is no
/// error path: a probe that cannot determine its answer reports false.
pub fn classify(rt: &dyn GuestRuntime, r: GuestRef) -> Capabilities {
    let mut caps = Capabilities::empty();
    if rt.is_function(r) {
        caps |= Capabilities::FUNCTION;
    }
    if rt.is_promise(r) {
        caps |= Capabilities::PROMISE;
    }
    if rt.is_iterable(r) {
        caps |= Capabilities::ITERABLE;
    }
    if rt.is_iterator(r) {
        caps |= Capabilities::ITERATOR;
    }
    if rt.has_length(r) {
        caps |= Capabilities::LENGTH;
    }
    if rt.has_get_method(r) {
        caps |= Capabilities::GET_METHOD;
    }
    if rt.has_set_method(r) {
        caps |= Capabilities::SET_METHOD;
    }
    if rt.has_has_method(r) {
        caps |= Capabilities::HAS_METHOD;
    }
    if rt.has_includes_method(r) {
        caps |= Capabilities::INCLUDES_METHOD;
    }
    if rt.is_typed_buffer(r) {
        caps |= Capabilities::TYPED_BUFFER;
    }
    if rt.is_array_like(r) {
        caps |= Capabilities::ARRAY;
    }
    caps
}

// =============================================================================
// Tests
// =============================================================================
