//! Proxy instances and the operation dispatcher.
//!
//! A `GuestProxy` is one live native wrapper around one guest value. The
//! instance owns a strong handle to its target (and a second one when it
//! represents a bound method); both are released by the destructor on every
//! path, including construction failures. All capability-dependent behavior
//! dispatches through the slot table of the instance's synthesized type;
//! the always-present behaviors (attributes, repr, truthiness, comparison,
//! enumeration) live directly on the instance.

use crate::buffer::{BufferAccess, BufferMeta};
use crate::call::{self, OptionsSupport};
use crate::convert;
use crate::error::BridgeError;
use crate::exception::{self, GuestException};
use crate::flags::{classify, Capabilities};
use crate::future::{self, GuestFuture};
use crate::subtype::{get_subtype, MethodDef, ProxyType};
use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;
use tether_core::{
    CompareOp, GuestRef, GuestRuntime, Handle, NativeObject, Scalar, SliceRange, Value,
};

// =============================================================================
// Iteration Results
// =============================================================================

/// What the iteration entry point designates as the iterator.
pub enum IterSource {
    /// The instance is its own iterator.
    Itself,
    /// A separate iterator value obtained from the guest.
    Remote(Value),
}

/// One step of proxy iteration.
pub enum IterOutcome {
    /// The iterator produced a value.
    Yield(Value),
    /// The iterator is exhausted; the payload is its final result.
    Done(Value),
}

// =============================================================================
// GuestProxy
// =============================================================================

/// A native object wrapping one guest value.
pub struct GuestProxy {
    ty: &'static ProxyType,
    rt: Rc<dyn GuestRuntime>,
    /// Strong reference to the wrapped value.
    target: Handle,
    /// Strong reference to the bound receiver, for method proxies.
    receiver: Option<Handle>,
    /// Lazily probed trailing-options answer, per instance.
    options: Cell<OptionsSupport>,
    /// Buffer metadata; present exactly when the type uses the buffered
    /// layout.
    buffer: Option<BufferMeta>,
}

impl NativeObject for GuestProxy {
    fn type_name(&self) -> &'static str {
        self.ty.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

// =============================================================================
// Creation
// =============================================================================

/// Surface a guest value as a native proxy object.
///
/// Borrows `target`; the proxy takes its own retain. Guest error values
/// surface as [`GuestException`] objects instead of plain proxies.
pub fn wrap(rt: &Rc<dyn GuestRuntime>, target: GuestRef) -> Result<Value, BridgeError> {
    wrap_with(rt, target, None)
}

/// Surface a guest callable as a bound method proxy.
///
/// The proxy holds a second strong handle to `receiver` and passes it as
/// the call receiver on every invocation.
pub fn wrap_with_receiver(
    rt: &Rc<dyn GuestRuntime>,
    target: GuestRef,
    receiver: GuestRef,
) -> Result<Value, BridgeError> {
    wrap_with(rt, target, Some(receiver))
}

fn wrap_with(
    rt: &Rc<dyn GuestRuntime>,
    target: GuestRef,
    receiver: Option<GuestRef>,
) -> Result<Value, BridgeError> {
    if rt.is_error(target) {
        return Ok(Value::object(GuestException::new(error_proxy(rt, target))));
    }
    let caps = classify(rt.as_ref(), target);
    Ok(Value::Object(new_proxy(rt, target, receiver, caps)?))
}

fn new_proxy(
    rt: &Rc<dyn GuestRuntime>,
    target: GuestRef,
    receiver: Option<GuestRef>,
    caps: Capabilities,
) -> Result<Rc<GuestProxy>, BridgeError> {
    let ty = get_subtype(caps);
    let target = Handle::retain(Rc::clone(rt), target);
    let receiver = receiver.map(|r| Handle::retain(Rc::clone(rt), r));
    // The one capability that changes instance layout. A failure here still
    // releases the handles above through their destructors.
    let buffer = if ty.buffered {
        Some(BufferMeta::from_guest(rt.as_ref(), target.raw())?)
    } else {
        None
    };
    Ok(Rc::new(GuestProxy {
        ty,
        rt: Rc::clone(rt),
        target,
        receiver,
        options: Cell::new(OptionsSupport::Unknown),
        buffer,
    }))
}

/// Wrap a guest error value as a capability-free base proxy.
pub(crate) fn error_proxy(rt: &Rc<dyn GuestRuntime>, target: GuestRef) -> Rc<GuestProxy> {
    Rc::new(GuestProxy {
        ty: get_subtype(Capabilities::empty()),
        rt: Rc::clone(rt),
        target: Handle::retain(Rc::clone(rt), target),
        receiver: None,
        options: Cell::new(OptionsSupport::Unknown),
        buffer: None,
    })
}

// =============================================================================
// Accessors
// =============================================================================

impl GuestProxy {
    /// The synthesized type this instance dispatches through.
    #[inline]
    pub fn proxy_type(&self) -> &'static ProxyType {
        self.ty
    }

    /// The capability bitset computed at wrap time.
    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.ty.flags
    }

    /// The guest runtime owning the wrapped value.
    #[inline]
    pub fn runtime(&self) -> &Rc<dyn GuestRuntime> {
        &self.rt
    }

    /// The wrapped value's reference. Does not transfer ownership.
    #[inline]
    pub fn target_ref(&self) -> GuestRef {
        self.target.raw()
    }

    pub(crate) fn target_handle(&self) -> &Handle {
        &self.target
    }

    pub(crate) fn receiver_ref(&self) -> Option<GuestRef> {
        self.receiver.as_ref().map(Handle::raw)
    }

    /// Whether this instance represents a bound method (holds a receiver).
    #[inline]
    pub fn is_bound_method(&self) -> bool {
        self.receiver.is_some()
    }

    /// Cached trailing-options answer.
    #[inline]
    pub fn options_support(&self) -> OptionsSupport {
        self.options.get()
    }

    pub(crate) fn set_options_support(&self, support: OptionsSupport) {
        self.options.set(support);
    }
}

// =============================================================================
// Always-Present Behaviors
// =============================================================================

impl GuestProxy {
    /// String conversion, via the guest value's own stringify.
    pub fn repr(&self) -> String {
        self.rt.stringify(self.target.raw())
    }

    /// The guest `typeof`-style type tag.
    pub fn type_tag(&self) -> &'static str {
        self.rt.type_tag(self.target.raw())
    }

    /// Boolean coercion, delegated to guest truthiness.
    pub fn is_truthy(&self) -> bool {
        self.rt.is_truthy(self.target.raw())
    }

    /// Attribute read.
    ///
    /// Resolution order: native members of the proxy itself (the `typeof`
    /// getter and the type's method table), then the guest value's named
    /// member. A callable member that is not an opposite-direction
    /// reflection comes back as a bound method proxy.
    pub fn get_attr(proxy: &Rc<GuestProxy>, name: &str) -> Result<Value, BridgeError> {
        if name == "typeof" {
            return Ok(Value::str(proxy.type_tag()));
        }
        if let Some(def) = proxy.ty.method(name) {
            return Ok(Value::object(BoundNativeMethod {
                receiver: Value::Object(Rc::clone(proxy) as Rc<dyn NativeObject>),
                def,
            }));
        }
        if name == "keys" && proxy.ty.flags.contains(Capabilities::ARRAY) {
            // Dict-shape sniffing probes for a `keys` member; on guest
            // arrays that name is an unrelated per-index accessor, so
            // pretend it is absent.
            return Err(BridgeError::attribute_error(name));
        }
        let rt = proxy.runtime();
        let member = match rt.get_member(proxy.target_ref(), name) {
            Some(m) => Handle::adopt(Rc::clone(rt), m),
            None => return Err(BridgeError::attribute_error(name)),
        };
        if rt.is_function(member.raw()) && !rt.is_native_reflection(member.raw()) {
            return wrap_with_receiver(rt, member.raw(), proxy.target_ref());
        }
        convert::guest_to_native(rt, member.raw())
    }

    /// Attribute write, forwarded to guest property set.
    pub fn set_attr(&self, name: &str, value: &Value) -> Result<(), BridgeError> {
        let guest_value = convert::native_to_guest(&self.rt, value)?;
        self.rt
            .set_member(self.target.raw(), name, guest_value.raw())
            .map_err(|e| exception::raise_guest_error(&self.rt, e))
    }

    /// Attribute delete, forwarded to guest property delete.
    pub fn del_attr(&self, name: &str) -> Result<(), BridgeError> {
        self.rt
            .delete_member(self.target.raw(), name)
            .map_err(|e| exception::raise_guest_error(&self.rt, e))
    }

    /// Attribute enumeration: native members plus a sorted, de-duplicated
    /// snapshot of the guest's own property names across its prototype
    /// chain, with the array `keys` exclusion applied.
    pub fn dir(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.ty.methods.len() + 8);
        names.push("typeof".to_string());
        names.extend(self.ty.methods.iter().map(|m| m.name.to_string()));
        names.extend(self.rt.own_property_names(self.target.raw()));
        if self.ty.flags.contains(Capabilities::ARRAY) {
            names.retain(|n| n != "keys");
        }
        names.sort();
        names.dedup();
        names
    }

    /// Equality and ordering.
    ///
    /// A proxy compared against anything that is not a proxy answers
    /// unequal for `==`/`!=`; ordering against such a value is refused.
    /// Between proxies, the guest's own comparison decides.
    pub fn richcompare(&self, other: &Value, op: CompareOp) -> Result<bool, BridgeError> {
        let other = match other.downcast::<GuestProxy>() {
            Some(o) => o,
            None => {
                return match op {
                    CompareOp::Eq => Ok(false),
                    CompareOp::Ne => Ok(true),
                    _ => Err(BridgeError::not_implemented(format!(
                        "'{}' not supported between '{}' and '{}'",
                        op.symbol(),
                        self.ty.name,
                        other.type_name()
                    ))),
                };
            }
        };
        Ok(self.rt.compare(op, self.target.raw(), other.target_ref()))
    }
}

// =============================================================================
// Capability-Dispatched Operations
// =============================================================================

impl GuestProxy {
    /// Length query.
    pub fn length(&self) -> Result<usize, BridgeError> {
        match self.ty.slots.length {
            Some(slot) => slot(self),
            None => Err(BridgeError::type_error(format!(
                "object of type '{}' has no len()",
                self.ty.name
            ))),
        }
    }

    /// Iteration entry point.
    pub fn get_iter(proxy: &Rc<GuestProxy>) -> Result<Value, BridgeError> {
        match proxy.ty.slots.iter {
            Some(slot) => match slot(proxy)? {
                IterSource::Itself => {
                    Ok(Value::Object(Rc::clone(proxy) as Rc<dyn NativeObject>))
                }
                IterSource::Remote(value) => Ok(value),
            },
            None => Err(BridgeError::type_error(format!(
                "'{}' object is not iterable",
                proxy.ty.name
            ))),
        }
    }

    /// Iterator advancement.
    pub fn iter_next(&self) -> Result<IterOutcome, BridgeError> {
        match self.ty.slots.next {
            Some(slot) => slot(self),
            None => Err(BridgeError::type_error(format!(
                "'{}' object is not an iterator",
                self.ty.name
            ))),
        }
    }

    /// Subscript read.
    pub fn subscript(&self, key: &Value) -> Result<Value, BridgeError> {
        match self.ty.slots.getitem {
            Some(slot) => slot(self, key),
            None => Err(BridgeError::type_error(format!(
                "'{}' object is not subscriptable",
                self.ty.name
            ))),
        }
    }

    /// Subscript write.
    pub fn set_subscript(&self, key: &Value, value: &Value) -> Result<(), BridgeError> {
        match self.ty.slots.setitem {
            Some(slot) => slot(self, key, Some(value)),
            None => Err(BridgeError::type_error(format!(
                "'{}' object does not support item assignment",
                self.ty.name
            ))),
        }
    }

    /// Subscript delete.
    pub fn del_subscript(&self, key: &Value) -> Result<(), BridgeError> {
        match self.ty.slots.setitem {
            Some(slot) => slot(self, key, None),
            None => Err(BridgeError::type_error(format!(
                "'{}' object does not support item deletion",
                self.ty.name
            ))),
        }
    }

    /// Containment check.
    pub fn contains(&self, item: &Value) -> Result<bool, BridgeError> {
        match self.ty.slots.contains {
            Some(slot) => slot(self, item),
            None => Err(BridgeError::type_error(format!(
                "argument of type '{}' is not a container",
                self.ty.name
            ))),
        }
    }

    /// Native call syntax.
    pub fn call(&self, args: &[Value], kwargs: &[(&str, Value)]) -> Result<Value, BridgeError> {
        call::call_proxy(self, args, kwargs)
    }

    /// Guest new-instance construction.
    pub fn construct_new(&self, args: &[Value]) -> Result<Value, BridgeError> {
        call::construct_proxy(self, args)
    }

    /// Native await support.
    pub fn await_ready(&self) -> Result<GuestFuture, BridgeError> {
        future::await_proxy(self)
    }

    /// Materialize to a native deep copy; `depth < 0` means unlimited.
    pub fn to_native(&self, depth: i32) -> Result<Value, BridgeError> {
        convert::materialize(&self.rt, self.target.raw(), depth)
    }

    /// The guest's own (key, value) entry pairs, as a new proxy.
    pub fn object_entries(&self) -> Result<Value, BridgeError> {
        let entries = Handle::adopt(
            Rc::clone(&self.rt),
            self.rt.object_entries(self.target.raw()),
        );
        wrap(&self.rt, entries.raw())
    }

    /// Whether this instance owns a copied buffer backing.
    pub fn has_backing(&self) -> bool {
        self.buffer.as_ref().map(BufferMeta::owns_backing).unwrap_or(false)
    }

    /// Acquire a view of the underlying typed memory.
    pub fn acquire_buffer(&self) -> Result<BufferAccess<'_>, BridgeError> {
        match &self.buffer {
            Some(meta) => Ok(meta.acquire(self.rt.as_ref(), self.target.raw())),
            None => Err(BridgeError::type_error(format!(
                "'{}' object does not expose a buffer",
                self.ty.name
            ))),
        }
    }
}

// =============================================================================
// Slot Implementations
// =============================================================================

pub(crate) fn length_guest(p: &GuestProxy) -> Result<usize, BridgeError> {
    p.runtime()
        .get_length(p.target_ref())
        .map(|n| n as usize)
        .ok_or_else(|| BridgeError::type_error("object does not have a valid length"))
}

pub(crate) fn iter_via_constructor(p: &GuestProxy) -> Result<IterSource, BridgeError> {
    let rt = p.runtime();
    let iterator = rt
        .get_iterator(p.target_ref())
        .map_err(|e| exception::raise_guest_error(rt, e))?;
    let iterator = Handle::adopt(Rc::clone(rt), iterator);
    Ok(IterSource::Remote(convert::guest_to_native(
        rt,
        iterator.raw(),
    )?))
}

pub(crate) fn iter_self(_p: &GuestProxy) -> Result<IterSource, BridgeError> {
    Ok(IterSource::Itself)
}

pub(crate) fn iter_advance(p: &GuestProxy) -> Result<IterOutcome, BridgeError> {
    let rt = p.runtime();
    let step = rt
        .advance_iterator(p.target_ref())
        .map_err(|e| exception::raise_guest_error(rt, e))?;
    let value = Handle::adopt(Rc::clone(rt), step.value);
    let value = convert::guest_to_native(rt, value.raw())?;
    Ok(if step.done {
        IterOutcome::Done(value)
    } else {
        IterOutcome::Yield(value)
    })
}

/// Keyed subscript read through the guest `get` method. A miss raises a
/// key-error instead of surfacing the guest's miss sentinel.
pub(crate) fn subscr_get_method(p: &GuestProxy, key: &Value) -> Result<Value, BridgeError> {
    let rt = p.runtime();
    let guest_key = convert::native_to_guest(rt, key)?;
    let result = rt
        .call_method(p.target_ref(), "get", &[guest_key.raw()])
        .map_err(|e| exception::raise_guest_error(rt, e))?;
    let result = Handle::adopt(Rc::clone(rt), result);
    if matches!(rt.as_scalar(result.raw()), Some(Scalar::Undefined)) {
        return Err(BridgeError::key_error(format!("{:?}", key)));
    }
    convert::guest_to_native(rt, result.raw())
}

/// Keyed subscript write/delete through the guest `set`/`delete` methods.
pub(crate) fn store_subscr_method(
    p: &GuestProxy,
    key: &Value,
    value: Option<&Value>,
) -> Result<(), BridgeError> {
    let rt = p.runtime();
    let guest_key = convert::native_to_guest(rt, key)?;
    match value {
        Some(v) => {
            let guest_value = convert::native_to_guest(rt, v)?;
            let result = rt
                .call_method(p.target_ref(), "set", &[guest_key.raw(), guest_value.raw()])
                .map_err(|e| exception::raise_guest_error(rt, e))?;
            drop(Handle::adopt(Rc::clone(rt), result));
            Ok(())
        }
        None => {
            let result = rt
                .call_method(p.target_ref(), "delete", &[guest_key.raw()])
                .map_err(|e| exception::raise_guest_error(rt, e))?;
            let result = Handle::adopt(Rc::clone(rt), result);
            if !rt.is_truthy(result.raw()) {
                return Err(BridgeError::key_error(format!("{:?}", key)));
            }
            Ok(())
        }
    }
}

fn resolve_array_index(p: &GuestProxy, index: i64) -> Option<u32> {
    let index = if index < 0 {
        index + p.runtime().get_length(p.target_ref()).unwrap_or(0) as i64
    } else {
        index
    };
    u32::try_from(index).ok()
}

/// Integer subscript read on an indexed array. Negative indices wrap from
/// the end using the current length.
pub(crate) fn subscr_array(p: &GuestProxy, key: &Value) -> Result<Value, BridgeError> {
    if key.downcast::<SliceRange>().is_some() {
        return Err(BridgeError::not_implemented(
            "slice subscripting isn't implemented",
        ));
    }
    let Some(index) = key.index() else {
        return Err(BridgeError::type_error(format!(
            "guest array indices must be integers or slices, not {}",
            key.type_name()
        )));
    };
    let rt = p.runtime();
    let element = resolve_array_index(p, index).and_then(|i| rt.get_index(p.target_ref(), i));
    match element {
        Some(e) => {
            let e = Handle::adopt(Rc::clone(rt), e);
            convert::guest_to_native(rt, e.raw())
        }
        None => Err(BridgeError::index_error(format!(
            "guest array index {} out of range",
            index
        ))),
    }
}

/// Integer subscript write/delete on an indexed array.
pub(crate) fn store_subscr_array(
    p: &GuestProxy,
    key: &Value,
    value: Option<&Value>,
) -> Result<(), BridgeError> {
    if key.downcast::<SliceRange>().is_some() {
        return Err(BridgeError::not_implemented(
            "slice subscripting isn't implemented",
        ));
    }
    let Some(index) = key.index() else {
        return Err(BridgeError::type_error(format!(
            "guest array indices must be integers or slices, not {}",
            key.type_name()
        )));
    };
    let rt = p.runtime();
    let Some(resolved) = resolve_array_index(p, index) else {
        return Err(BridgeError::index_error(format!(
            "guest array index {} out of range",
            index
        )));
    };
    match value {
        Some(v) => {
            let guest_value = convert::native_to_guest(rt, v)?;
            rt.set_index(p.target_ref(), resolved, guest_value.raw())
                .map_err(|e| exception::raise_guest_error(rt, e))
        }
        None => {
            if rt.delete_index(p.target_ref(), resolved) {
                Ok(())
            } else {
                Err(BridgeError::index_error(format!(
                    "guest array index {} out of range",
                    index
                )))
            }
        }
    }
}

pub(crate) fn contains_via_has(p: &GuestProxy, item: &Value) -> Result<bool, BridgeError> {
    contains_with_method(p, "has", item)
}

pub(crate) fn contains_via_includes(p: &GuestProxy, item: &Value) -> Result<bool, BridgeError> {
    contains_with_method(p, "includes", item)
}

fn contains_with_method(
    p: &GuestProxy,
    method: &str,
    item: &Value,
) -> Result<bool, BridgeError> {
    let rt = p.runtime();
    let guest_item = convert::native_to_guest(rt, item)?;
    let result = rt
        .call_method(p.target_ref(), method, &[guest_item.raw()])
        .map_err(|e| exception::raise_guest_error(rt, e))?;
    let result = Handle::adopt(Rc::clone(rt), result);
    Ok(rt.is_truthy(result.raw()))
}

// =============================================================================
// Native Method Implementations
// =============================================================================

pub(crate) fn method_to_native(p: &GuestProxy, args: &[Value]) -> Result<Value, BridgeError> {
    if args.len() > 1 {
        return Err(BridgeError::type_error(format!(
            "to_native expected at most 1 argument, got {}",
            args.len()
        )));
    }
    let depth = match args.first() {
        None => -1,
        Some(v) => v
            .as_int()
            .map(|d| d.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .ok_or_else(|| BridgeError::type_error("to_native depth must be an integer"))?,
    };
    p.to_native(depth)
}

pub(crate) fn method_object_entries(
    p: &GuestProxy,
    args: &[Value],
) -> Result<Value, BridgeError> {
    if !args.is_empty() {
        return Err(BridgeError::type_error("object_entries takes no arguments"));
    }
    p.object_entries()
}

pub(crate) fn method_new(p: &GuestProxy, args: &[Value]) -> Result<Value, BridgeError> {
    p.construct_new(args)
}

pub(crate) fn method_has_backing(p: &GuestProxy, args: &[Value]) -> Result<Value, BridgeError> {
    if !args.is_empty() {
        return Err(BridgeError::type_error("_has_backing takes no arguments"));
    }
    Ok(Value::Bool(p.has_backing()))
}

// =============================================================================
// BoundNativeMethod
// =============================================================================

/// A proxy native method bound to its instance, as produced by attribute
/// lookup.
pub struct BoundNativeMethod {
    receiver: Value,
    def: &'static MethodDef,
}

impl BoundNativeMethod {
    /// The method's name.
    pub fn name(&self) -> &'static str {
        self.def.name
    }

    /// The method's documentation line.
    pub fn doc(&self) -> &'static str {
        self.def.doc
    }

    /// Invoke the method on its bound instance.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, BridgeError> {
        let proxy = self.receiver.downcast::<GuestProxy>().ok_or_else(|| {
            BridgeError::internal("bound method receiver is not a guest proxy")
        })?;
        (self.def.func)(proxy, args)
    }
}

impl NativeObject for BoundNativeMethod {
    fn type_name(&self) -> &'static str {
        "builtin_method"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_rc(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
