//! Call bridge: native call syntax over guest callables.
//!
//! Positional arguments translate one-to-one. Keyword arguments have no
//! guest-side counterpart, so they ride as a single trailing options object
//! appended to the positional list, but only when the callee accepts one.
//! That answer is probed lazily on the first keyword-argument call and
//! cached per instance as an explicit tri-state; a callee that does not
//! accept options fails with a type error naming the offending keyword
//! before any argument translation happens.
//!
//! Call depth is bounded so a mutually recursive native/guest call cycle
//! surfaces as a recursion error instead of overflowing the native stack.

use crate::convert::{guest_to_native, native_to_guest};
use crate::error::BridgeError;
use crate::exception::raise_guest_error;
use crate::proxy::GuestProxy;
use smallvec::SmallVec;
use std::cell::Cell;
use std::rc::Rc;
use tether_core::{GuestRef, Handle, Value};

// =============================================================================
// Options Support
// =============================================================================

/// Cached per-instance answer to "does the callee accept a trailing options
/// object", probed lazily on the first keyword-argument call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionsSupport {
    #[default]
    Unknown,
    No,
    Yes,
}

// =============================================================================
// Call Depth
// =============================================================================

/// Maximum bridged call depth.
pub const CALL_DEPTH_LIMIT: u32 = 1000;

thread_local! {
    static CALL_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// RAII depth ticket; the slot is released on every exit path.
#[derive(Debug)]
struct DepthGuard;

impl DepthGuard {
    fn enter() -> Result<Self, BridgeError> {
        CALL_DEPTH.with(|depth| {
            let current = depth.get();
            if current >= CALL_DEPTH_LIMIT {
                return Err(BridgeError::recursion(
                    "maximum call depth exceeded in guest call",
                ));
            }
            depth.set(current + 1);
            Ok(DepthGuard)
        })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

// =============================================================================
// Call
// =============================================================================

/// Invoke a callable proxy with positional and keyword arguments.
pub(crate) fn call_proxy(
    p: &GuestProxy,
    args: &[Value],
    kwargs: &[(&str, Value)],
) -> Result<Value, BridgeError> {
    if !p.proxy_type().callable {
        return Err(BridgeError::type_error(format!(
            "'{}' object is not callable",
            p.proxy_type().name
        )));
    }
    let rt = p.runtime();

    // Resolve keyword support before translating anything.
    let send_options = if kwargs.is_empty() {
        false
    } else {
        let support = match p.options_support() {
            OptionsSupport::Unknown => {
                let probed = match rt.supports_trailing_options(p.target_ref()) {
                    Ok(true) => OptionsSupport::Yes,
                    Ok(false) => OptionsSupport::No,
                    Err(e) => return Err(raise_guest_error(rt, e)),
                };
                p.set_options_support(probed);
                probed
            }
            cached => cached,
        };
        if support == OptionsSupport::No {
            return Err(BridgeError::type_error(format!(
                "guest callable got an unexpected keyword argument '{}'",
                kwargs[0].0
            )));
        }
        true
    };

    let _depth = DepthGuard::enter()?;

    let mut handles: SmallVec<[Handle; 8]> = SmallVec::with_capacity(args.len() + 1);
    for arg in args {
        handles.push(native_to_guest(rt, arg)?);
    }
    if send_options {
        let options = Handle::adopt(Rc::clone(rt), rt.alloc_object());
        for (name, value) in kwargs {
            let element = native_to_guest(rt, value)?;
            rt.set_member(options.raw(), name, element.raw())
                .map_err(|e| raise_guest_error(rt, e))?;
        }
        handles.push(options);
    }

    let raw_args: SmallVec<[GuestRef; 8]> = handles.iter().map(Handle::raw).collect();
    let result = rt
        .call_bound(p.target_ref(), p.receiver_ref(), &raw_args)
        .map_err(|e| raise_guest_error(rt, e))?;
    let result = Handle::adopt(Rc::clone(rt), result);
    guest_to_native(rt, result.raw())
}

// =============================================================================
// Construct
// =============================================================================

/// Run the guest new-instance-construction protocol on a callable proxy.
///
/// Returns a fresh converted result; the existing proxy is never reused or
/// mutated.
pub(crate) fn construct_proxy(p: &GuestProxy, args: &[Value]) -> Result<Value, BridgeError> {
    if !p.proxy_type().callable {
        return Err(BridgeError::type_error(format!(
            "'{}' object cannot be constructed",
            p.proxy_type().name
        )));
    }
    let rt = p.runtime();

    let mut handles: SmallVec<[Handle; 8]> = SmallVec::with_capacity(args.len());
    for arg in args {
        handles.push(native_to_guest(rt, arg)?);
    }
    let raw_args: SmallVec<[GuestRef; 8]> = handles.iter().map(Handle::raw).collect();
    let result = rt
        .construct(p.target_ref(), &raw_args)
        .map_err(|e| raise_guest_error(rt, e))?;
    let result = Handle::adopt(Rc::clone(rt), result);
    guest_to_native(rt, result.raw())
}

// =============================================================================
// Tests
// =============================================================================
