//! Wrapped guest errors.
//!
//! An exception raised on the guest side crosses the boundary as a
//! `GuestException`: a native error object carrying a proxy of the original
//! guest error value. It propagates natively as `BridgeError::Foreign` and
//! the original value stays inspectable through the proxy afterward.

use crate::error::BridgeError;
use crate::proxy::{self, GuestProxy};
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use tether_core::{GuestRef, GuestRuntime, Handle, NativeObject};

// =============================================================================
// GuestException
// =============================================================================

/// A native exception wrapping a guest error value.
#[derive(Clone)]
pub struct GuestException {
    proxy: Rc<GuestProxy>,
    message: String,
}

impl GuestException {
    /// Wrap an error-value proxy.
    pub(crate) fn new(proxy: Rc<GuestProxy>) -> Self {
        let message = proxy.repr();
        Self { proxy, message }
    }

    /// The proxy of the original guest error value.
    pub fn proxy(&self) -> &Rc<GuestProxy> {
        &self.proxy
    }

    /// The guest error's own string conversion, captured at wrap time.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl NativeObject for GuestException {
    fn type_name(&self) -> &'static str {
        "GuestException"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Debug for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GuestException({:?})", self.message)
    }
}

/// Wrap an owned guest error reference into a raisable bridge error.
///
/// Consumes the handle; the wrapped proxy takes its own retain.
pub(crate) fn wrap_guest_error(rt: &Rc<dyn GuestRuntime>, err: Handle) -> BridgeError {
    let exc = GuestException::new(proxy::error_proxy(rt, err.raw()));
    BridgeError::foreign(exc)
}

/// Convenience for `Result<_, GuestRef>` returns from the guest runtime.
pub(crate) fn raise_guest_error(rt: &Rc<dyn GuestRuntime>, err: GuestRef) -> BridgeError {
    wrap_guest_error(rt, Handle::adopt(Rc::clone(rt), err))
}
