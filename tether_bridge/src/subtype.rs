//! Proxy type synthesis and the process-wide subtype cache.
//!
//! One `ProxyType` exists per distinct capability bitset. Instead of a
//! hand-written wrapper type per capability combination, a dispatch table of
//! function pointers is assembled once per combination, leaked, and cached
//! forever in a registry keyed by the bitset's integer encoding. Cache
//! entries are never evicted: cardinality is bounded by the 11-bit flag
//! space, and in practice a few dozen combinations occur. Two values with
//! the same bitset are therefore always instances of the *same* type object,
//! so pointer-identity checks on `ProxyType` are meaningful.

use crate::error::BridgeError;
use crate::flags::Capabilities;
use crate::proxy::{self, GuestProxy, IterOutcome, IterSource};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tether_core::Value;

// =============================================================================
// Dispatch Slots
// =============================================================================

/// Capability-conditional behaviors, installed per type.
///
/// A `None` slot means the operation is unsupported for values of this
/// shape and the dispatcher raises the appropriate typed error.
#[derive(Default)]
pub struct ProxySlots {
    /// Iteration entry point.
    pub iter: Option<fn(&GuestProxy) -> Result<IterSource, BridgeError>>,
    /// Iterator advancement.
    pub next: Option<fn(&GuestProxy) -> Result<IterOutcome, BridgeError>>,
    /// Length query.
    pub length: Option<fn(&GuestProxy) -> Result<usize, BridgeError>>,
    /// Subscript read.
    pub getitem: Option<fn(&GuestProxy, &Value) -> Result<Value, BridgeError>>,
    /// Subscript write (`Some` value) and delete (`None` value).
    pub setitem: Option<fn(&GuestProxy, &Value, Option<&Value>) -> Result<(), BridgeError>>,
    /// Containment check.
    pub contains: Option<fn(&GuestProxy, &Value) -> Result<bool, BridgeError>>,
}

/// A native method installed on a proxy type.
///
/// These are the instance-local members attribute lookup resolves before
/// falling back to the guest value, and the names `dir()` always reports.
pub struct MethodDef {
    pub name: &'static str,
    pub doc: &'static str,
    pub func: fn(&GuestProxy, &[Value]) -> Result<Value, BridgeError>,
}

// =============================================================================
// ProxyType
// =============================================================================

/// A synthesized proxy type: one per distinct capability bitset, cached for
/// the process lifetime.
pub struct ProxyType {
    /// Type name shown by diagnostics (`GuestBuffer` for the buffered
    /// layout, `GuestProxy` otherwise).
    pub name: &'static str,
    /// The bitset this type was synthesized for.
    pub flags: Capabilities,
    /// Capability-conditional dispatch table.
    pub slots: ProxySlots,
    /// Native methods, including the always-present entries.
    pub methods: &'static [MethodDef],
    /// Instances are callable.
    pub callable: bool,
    /// Instances support native await.
    pub awaitable: bool,
    /// Instances use the buffered layout (extra buffer metadata storage).
    pub buffered: bool,
}

impl ProxyType {
    /// Look up a native method by name.
    pub fn method(&self, name: &str) -> Option<&'static MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }
}

// =============================================================================
// Registry
// =============================================================================

static REGISTRY: OnceLock<RwLock<FxHashMap<u16, &'static ProxyType>>> = OnceLock::new();
static SYNTHESIZED: AtomicU64 = AtomicU64::new(0);
static HITS: AtomicU64 = AtomicU64::new(0);

fn registry() -> &'static RwLock<FxHashMap<u16, &'static ProxyType>> {
    REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Subtype cache counters.
#[derive(Debug, Clone, Copy)]
pub struct RegistryStats {
    /// Types synthesized since process start.
    pub synthesized: u64,
    /// Cache hits since process start.
    pub hits: u64,
}

/// Snapshot the subtype cache counters.
pub fn registry_stats() -> RegistryStats {
    RegistryStats {
        synthesized: SYNTHESIZED.load(Ordering::Relaxed),
        hits: HITS.load(Ordering::Relaxed),
    }
}

/// Fetch the proxy type for a capability bitset, synthesizing on first use.
///
/// Hits are O(1). Misses assemble the slot table implied by the set bits,
/// leak it, and publish it; the entry then lives for the process lifetime.
/// Reentrant synthesis of *different* bitsets is fine; the engine runs on
/// the single cooperative scheduler thread of the native runtime and claims
/// nothing stronger.
pub fn get_subtype(flags: Capabilities) -> &'static ProxyType {
    let key = flags.encode();
    {
        let table = registry().read();
        if let Some(ty) = table.get(&key).copied() {
            HITS.fetch_add(1, Ordering::Relaxed);
            return ty;
        }
    }

    let ty: &'static ProxyType = Box::leak(Box::new(synthesize(flags)));
    let mut table = registry().write();
    let entry = *table.entry(key).or_insert(ty);
    if std::ptr::eq(entry, ty) {
        SYNTHESIZED.fetch_add(1, Ordering::Relaxed);
    }
    entry
}

/// Assemble the dispatch table and method set implied by a bitset.
fn synthesize(flags: Capabilities) -> ProxyType {
    let mut slots = ProxySlots::default();

    if flags.contains(Capabilities::ITERABLE) {
        slots.iter = Some(proxy::iter_via_constructor);
    }
    if flags.contains(Capabilities::ITERATOR) {
        // An iterator is its own iteration entry point; this overrides the
        // ITERABLE wiring when both bits are set.
        slots.iter = Some(proxy::iter_self);
        slots.next = Some(proxy::iter_advance);
    }
    if flags.contains(Capabilities::LENGTH) {
        slots.length = Some(proxy::length_guest);
    }
    if flags.contains(Capabilities::GET_METHOD) {
        slots.getitem = Some(proxy::subscr_get_method);
    }
    if flags.contains(Capabilities::SET_METHOD) {
        slots.setitem = Some(proxy::store_subscr_method);
    }
    if flags.contains(Capabilities::INCLUDES_METHOD) {
        slots.contains = Some(proxy::contains_via_includes);
    }
    if flags.contains(Capabilities::HAS_METHOD) {
        // `has` is the cheap containment check; it wins over `includes`
        // when both are present.
        slots.contains = Some(proxy::contains_via_has);
    }
    if flags.contains(Capabilities::ARRAY) {
        // Indexed arrays subscript by integer, not through keyed methods;
        // this overrides the GET/SET wiring when both bits are set.
        slots.getitem = Some(proxy::subscr_array);
        slots.setitem = Some(proxy::store_subscr_array);
    }

    let mut methods: SmallVec<[MethodDef; 5]> = SmallVec::new();
    methods.push(MethodDef {
        name: "to_native",
        doc: "Materialize the guest value as a native deep copy, optionally depth-limited.",
        func: proxy::method_to_native,
    });
    methods.push(MethodDef {
        name: "object_entries",
        doc: "Return the guest's own (key, value) entry pairs as a new proxy.",
        func: proxy::method_object_entries,
    });
    if flags.contains(Capabilities::FUNCTION) {
        methods.push(MethodDef {
            name: "new",
            doc: "Construct a new guest instance of this callable.",
            func: proxy::method_new,
        });
    }
    if flags.contains(Capabilities::TYPED_BUFFER) {
        methods.push(MethodDef {
            name: "_has_backing",
            doc: "Whether this buffer owns a copied backing allocation.",
            func: proxy::method_has_backing,
        });
    }

    let buffered = flags.contains(Capabilities::TYPED_BUFFER);
    ProxyType {
        name: if buffered { "GuestBuffer" } else { "GuestProxy" },
        flags,
        slots,
        methods: Box::leak(methods.into_vec().into_boxed_slice()),
        callable: flags.contains(Capabilities::FUNCTION),
        awaitable: flags.contains(Capabilities::PROMISE),
        buffered,
    }
}

// =============================================================================
// Tests
// =============================================================================
