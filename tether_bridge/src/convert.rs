//! Value conversion entry points.
//!
//! The implicit scalar converter and the opposite-direction proxy are
//! external collaborators; this module is the engine-facing seam. Scalars
//! cross by copy, guest error values cross as wrapped errors, and everything
//! else crosses as a proxy. `materialize` is the explicit deep-conversion
//! entry point (the proxies' `to_native` method), depth-limited.

use crate::error::BridgeError;
use crate::proxy::{self, GuestProxy};
use crate::exception::GuestException;
use std::rc::Rc;
use tether_core::{GuestRef, GuestRuntime, Handle, Scalar, Value};

/// Largest float that still identifies an exact integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

// =============================================================================
// Guest → Native
// =============================================================================

/// Surface a guest value as a native value.
///
/// Borrows `r`. Scalars convert by copy; guest errors wrap; everything else
/// becomes a proxy.
pub fn guest_to_native(rt: &Rc<dyn GuestRuntime>, r: GuestRef) -> Result<Value, BridgeError> {
    if let Some(s) = rt.as_scalar(r) {
        return Ok(scalar_to_value(&s));
    }
    proxy::wrap(rt, r)
}

fn scalar_to_value(s: &Scalar) -> Value {
    match s {
        Scalar::Undefined | Scalar::Null => Value::None,
        Scalar::Bool(b) => Value::Bool(*b),
        Scalar::Number(x) => {
            if x.fract() == 0.0 && x.abs() <= MAX_SAFE_INTEGER {
                Value::Int(*x as i64)
            } else {
                Value::Float(*x)
            }
        }
        Scalar::Str(s) => Value::str(s.as_str()),
    }
}

// =============================================================================
// Native → Guest
// =============================================================================

/// Convey a native value into the guest runtime.
///
/// Returns an owned handle. Proxies unwrap to their underlying guest value;
/// native objects with no guest representation (the opposite-direction
/// proxy is an external collaborator) raise a type error.
pub fn native_to_guest(rt: &Rc<dyn GuestRuntime>, v: &Value) -> Result<Handle, BridgeError> {
    let scalar = match v {
        Value::None => Some(Scalar::Undefined),
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Int(i) => Some(Scalar::Number(*i as f64)),
        Value::Float(f) => Some(Scalar::Number(*f)),
        Value::Str(s) => Some(Scalar::Str(s.to_string())),
        _ => None,
    };
    if let Some(s) = scalar {
        return Ok(Handle::adopt(Rc::clone(rt), rt.from_scalar(&s)));
    }

    match v {
        Value::List(items) => {
            let array = Handle::adopt(Rc::clone(rt), rt.alloc_array());
            for item in items.borrow().iter() {
                let element = native_to_guest(rt, item)?;
                rt.array_push(array.raw(), element.raw());
            }
            Ok(array)
        }
        Value::Dict(map) => {
            let object = Handle::adopt(Rc::clone(rt), rt.alloc_object());
            for (key, value) in map.borrow().iter() {
                let element = native_to_guest(rt, value)?;
                rt.set_member(object.raw(), key, element.raw())
                    .map_err(|e| crate::exception::raise_guest_error(rt, e))?;
            }
            Ok(object)
        }
        Value::Object(_) => {
            if let Some(p) = v.downcast::<GuestProxy>() {
                return Ok(p.target_handle().clone());
            }
            if let Some(exc) = v.downcast::<GuestException>() {
                return Ok(exc.proxy().target_handle().clone());
            }
            Err(BridgeError::type_error(format!(
                "no guest representation for native '{}' object",
                v.type_name()
            )))
        }
        // Scalars were handled above.
        _ => unreachable!("scalar conversion handled earlier"),
    }
}

// =============================================================================
// Materialize
// =============================================================================

/// Deep-copy a guest value into native containers, depth-limited.
///
/// `depth < 0` means unlimited. `depth == 0` stops descending: the value is
/// surfaced the same way implicit conversion would surface it (scalars by
/// copy, the rest proxied). Arrays become lists; plain entry-bearing objects
/// become dicts; functions, promises, iterators, keyed containers and typed
/// buffers are leaves and stay proxied.
pub fn materialize(
    rt: &Rc<dyn GuestRuntime>,
    r: GuestRef,
    depth: i32,
) -> Result<Value, BridgeError> {
    if let Some(s) = rt.as_scalar(r) {
        return Ok(scalar_to_value(&s));
    }
    if depth == 0 || rt.is_error(r) {
        return guest_to_native(rt, r);
    }
    let next_depth = if depth < 0 { -1 } else { depth - 1 };

    if rt.is_array_like(r) {
        let len = rt.get_length(r).unwrap_or(0);
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            match rt.get_index(r, i) {
                Some(element) => {
                    let element = Handle::adopt(Rc::clone(rt), element);
                    items.push(materialize(rt, element.raw(), next_depth)?);
                }
                // Array holes surface as the unit value.
                None => items.push(Value::None),
            }
        }
        return Ok(Value::list(items));
    }

    if is_plain_object(rt.as_ref(), r) {
        let entries = Handle::adopt(Rc::clone(rt), rt.object_entries(r));
        let len = rt.get_length(entries.raw()).unwrap_or(0);
        let out = Value::dict();
        if let Value::Dict(map) = &out {
            let mut map = map.borrow_mut();
            for i in 0..len {
                let pair = match rt.get_index(entries.raw(), i) {
                    Some(p) => Handle::adopt(Rc::clone(rt), p),
                    None => continue,
                };
                let key = match rt.get_index(pair.raw(), 0) {
                    Some(k) => Handle::adopt(Rc::clone(rt), k),
                    None => continue,
                };
                let value = match rt.get_index(pair.raw(), 1) {
                    Some(v) => Handle::adopt(Rc::clone(rt), v),
                    None => continue,
                };
                let key = match rt.as_scalar(key.raw()) {
                    Some(Scalar::Str(s)) => s,
                    _ => rt.stringify(key.raw()),
                };
                map.insert(key.into(), materialize(rt, value.raw(), next_depth)?);
            }
        }
        return Ok(out);
    }

    guest_to_native(rt, r)
}

/// A value that materializes as a dict: an entry-bearing object that is not
/// callable, thenable, iterable machinery or typed memory.
fn is_plain_object(rt: &dyn GuestRuntime, r: GuestRef) -> bool {
    rt.type_tag(r) == "object"
        && !rt.is_promise(r)
        && !rt.is_typed_buffer(r)
        && !rt.is_iterator(r)
        && !rt.has_get_method(r)
}

// =============================================================================
// Tests
// =============================================================================
