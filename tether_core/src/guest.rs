//! Guest runtime interface and owned references.
//!
//! The guest side is an embedded prototype-based, single-threaded,
//! promise-driven script runtime. The bridge never sees its value
//! representation; every interaction goes through opaque reference-counted
//! `GuestRef` identifiers and the `GuestRuntime` operation battery
//! implemented by the host embedding.
//!
//! Ownership convention: a `GuestRef` returned by a `GuestRuntime` method is
//! owned by the caller and must be released exactly once. The `Handle` type
//! makes that automatic; bridge code wraps every received reference in a
//! `Handle` immediately so that release happens on every exit path through
//! the destructor, never through manually paired calls.

use std::fmt;
use std::rc::Rc;

// =============================================================================
// References
// =============================================================================

/// Opaque identifier for a guest-owned value.
///
/// Plain data: copying a `GuestRef` does not affect the reference count.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuestRef(pub u64);

impl fmt::Debug for GuestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestRef({})", self.0)
    }
}

/// Comparison operators forwarded to the guest runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
}

impl CompareOp {
    /// Operator spelling for error messages.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Whether this operator is an equality test rather than an ordering.
    #[inline]
    pub fn is_equality(self) -> bool {
        matches!(self, CompareOp::Eq | CompareOp::Ne)
    }
}

/// One step of guest iterator advancement.
///
/// `value` is owned by the caller. When `done` is set, `value` carries the
/// iterator's final result (the guest's generator return value), which may
/// be the guest undefined value.
pub struct IterStep {
    pub done: bool,
    pub value: GuestRef,
}

/// Scalar classification used by the implicit-conversion collaborator.
///
/// Values of these shapes cross the boundary by copy instead of by proxy.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

// =============================================================================
// GuestRuntime
// =============================================================================

/// The operation battery the bridge consumes from the guest embedding.
///
/// Probes are infallible: a probe that cannot determine its answer reports
/// `false`. Operations that can raise on the guest side return the guest
/// error value (owned by the caller) as the `Err` payload.
pub trait GuestRuntime {
    // -------------------------------------------------------------------------
    // Lifetime
    // -------------------------------------------------------------------------

    /// Retain a guest value.
    fn incref(&self, r: GuestRef);

    /// Release a guest value.
    fn decref(&self, r: GuestRef);

    // -------------------------------------------------------------------------
    // Capability probes
    // -------------------------------------------------------------------------

    fn is_function(&self, r: GuestRef) -> bool;
    fn is_promise(&self, r: GuestRef) -> bool;
    fn is_iterable(&self, r: GuestRef) -> bool;
    fn is_iterator(&self, r: GuestRef) -> bool;
    /// True when the value carries a `size` or `length` member.
    fn has_length(&self, r: GuestRef) -> bool;
    fn has_get_method(&self, r: GuestRef) -> bool;
    fn has_set_method(&self, r: GuestRef) -> bool;
    fn has_has_method(&self, r: GuestRef) -> bool;
    fn has_includes_method(&self, r: GuestRef) -> bool;
    fn is_typed_buffer(&self, r: GuestRef) -> bool;
    /// True for genuine indexed arrays, not for every length-bearing value.
    fn is_array_like(&self, r: GuestRef) -> bool;
    /// True when the value is a guest error object.
    fn is_error(&self, r: GuestRef) -> bool;
    /// True when the value is itself a reflection of a native value
    /// (the opposite-direction proxy, owned by an external collaborator).
    fn is_native_reflection(&self, r: GuestRef) -> bool;
    /// True when the value's backing memory is addressable by the native
    /// runtime without copying.
    fn is_directly_addressable(&self, r: GuestRef) -> bool;
    /// Guest truthiness. False exactly when the value is falsy in the guest,
    /// has a `size` member equal to zero, or is an indexed array with a
    /// `length` member equal to zero; a zero-argument callable stays truthy.
    fn is_truthy(&self, r: GuestRef) -> bool;

    // -------------------------------------------------------------------------
    // Members
    // -------------------------------------------------------------------------

    /// Read a named member. `None` means the member is absent.
    fn get_member(&self, r: GuestRef, name: &str) -> Option<GuestRef>;
    fn set_member(&self, r: GuestRef, name: &str, value: GuestRef) -> Result<(), GuestRef>;
    fn delete_member(&self, r: GuestRef, name: &str) -> Result<(), GuestRef>;

    /// Read an indexed element. `None` means the index is out of range.
    fn get_index(&self, r: GuestRef, index: u32) -> Option<GuestRef>;
    fn set_index(&self, r: GuestRef, index: u32, value: GuestRef) -> Result<(), GuestRef>;
    /// Delete an indexed element; reports whether the element existed.
    fn delete_index(&self, r: GuestRef, index: u32) -> bool;

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Invoke a callable with an optional bound receiver.
    fn call_bound(
        &self,
        callee: GuestRef,
        receiver: Option<GuestRef>,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestRef>;

    /// Run the guest new-instance-construction protocol.
    fn construct(&self, callee: GuestRef, args: &[GuestRef]) -> Result<GuestRef, GuestRef>;

    /// Invoke a named method on a value (drives `get`/`set`/`delete`/`has`/
    /// `includes` dispatch).
    fn call_method(
        &self,
        target: GuestRef,
        name: &str,
        args: &[GuestRef],
    ) -> Result<GuestRef, GuestRef>;

    /// Call the value's iterator constructor.
    fn get_iterator(&self, r: GuestRef) -> Result<GuestRef, GuestRef>;

    /// Advance an iterator one step.
    fn advance_iterator(&self, r: GuestRef) -> Result<IterStep, GuestRef>;

    /// The value's own string conversion.
    fn stringify(&self, r: GuestRef) -> String;

    /// The guest `typeof`-style type tag.
    fn type_tag(&self, r: GuestRef) -> &'static str;

    /// Guest identity/ordering comparison.
    fn compare(&self, op: CompareOp, a: GuestRef, b: GuestRef) -> bool;

    /// Length query; the guest prefers `size` over `length` when both exist.
    /// `None` means the value has no usable length.
    fn get_length(&self, r: GuestRef) -> Option<u32>;

    /// Guest `(key, value)` entry pairs as a fresh guest array.
    fn object_entries(&self, r: GuestRef) -> GuestRef;

    /// Own property names across the full prototype chain, in guest order,
    /// possibly with duplicates.
    fn own_property_names(&self, r: GuestRef) -> Vec<String>;

    /// Whether a callable accepts a trailing options object.
    fn supports_trailing_options(&self, callee: GuestRef) -> Result<bool, GuestRef>;

    // -------------------------------------------------------------------------
    // Typed buffers
    // -------------------------------------------------------------------------

    /// Element type tag (`"u8"`, `"i32"`, `"f64"`, ...) of a typed buffer.
    fn element_format(&self, r: GuestRef) -> Option<String>;

    /// Total byte length of a typed buffer.
    fn byte_length(&self, r: GuestRef) -> usize;

    /// Copy the buffer's current contents into `dst` (`dst.len()` bytes).
    fn copy_bytes_to(&self, r: GuestRef, dst: &mut [u8]);

    /// Stable pointer to the buffer's memory, when directly addressable.
    fn direct_byte_ptr(&self, r: GuestRef) -> Option<*mut u8>;

    /// Guest constructor name, for diagnostics.
    fn constructor_name(&self, r: GuestRef) -> String;

    // -------------------------------------------------------------------------
    // Promises
    // -------------------------------------------------------------------------

    /// Normalize a thenable into a settled-trackable promise.
    fn resolve_promise(&self, r: GuestRef) -> GuestRef;

    /// Attach settlement callbacks. Each callback receives an owned
    /// reference to the outcome value and runs at most once, on the guest
    /// job queue.
    fn attach_then(
        &self,
        promise: GuestRef,
        on_resolve: Box<dyn FnOnce(GuestRef)>,
        on_reject: Box<dyn FnOnce(GuestRef)>,
    );

    // -------------------------------------------------------------------------
    // Scalar bridging (consumed by the implicit-conversion collaborator)
    // -------------------------------------------------------------------------

    /// Classify a value as a by-copy scalar, if it is one.
    fn as_scalar(&self, r: GuestRef) -> Option<Scalar>;

    /// Allocate a scalar guest value.
    fn from_scalar(&self, s: &Scalar) -> GuestRef;

    /// Allocate an empty guest array.
    fn alloc_array(&self) -> GuestRef;

    /// Append to a guest array; the array retains the element.
    fn array_push(&self, array: GuestRef, value: GuestRef);

    /// Allocate an empty guest object.
    fn alloc_object(&self) -> GuestRef;
}

// =============================================================================
// Handle
// =============================================================================

/// An owned reference to a guest value.
///
/// `Clone` retains, `Drop` releases. All bridge-held guest references live
/// in `Handle`s so that error paths cannot leak: unwinding or early return
/// runs the destructor.
pub struct Handle {
    rt: Rc<dyn GuestRuntime>,
    raw: GuestRef,
}

impl Handle {
    /// Take ownership of a reference the runtime already counted for us.
    #[inline]
    pub fn adopt(rt: Rc<dyn GuestRuntime>, raw: GuestRef) -> Self {
        Self { rt, raw }
    }

    /// Retain a borrowed reference.
    #[inline]
    pub fn retain(rt: Rc<dyn GuestRuntime>, raw: GuestRef) -> Self {
        rt.incref(raw);
        Self { rt, raw }
    }

    /// The underlying reference. Does not transfer ownership.
    #[inline]
    pub fn raw(&self) -> GuestRef {
        self.raw
    }

    /// The runtime that owns the referenced value.
    #[inline]
    pub fn runtime(&self) -> &Rc<dyn GuestRuntime> {
        &self.rt
    }

}

impl Clone for Handle {
    fn clone(&self) -> Self {
        Handle::retain(Rc::clone(&self.rt), self.raw)
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.rt.decref(self.raw);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self.raw.0)
    }
}

// =============================================================================
// Tests
// =============================================================================
