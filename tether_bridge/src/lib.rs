//! Proxy engine surfacing guest-runtime values as native objects.
//!
//! A guest value enters at [`proxy::wrap`]; its capabilities are probed once
//! ([`flags::classify`]); a dispatch table synthesized for that exact
//! capability combination is fetched from the process-wide cache
//! ([`subtype::get_subtype`]); and a [`proxy::GuestProxy`] instance is bound
//! to the value's handle. Every later operation on the instance goes through
//! the slots its type installed: iteration, indexing, containment, calls,
//! awaiting and buffer access are each present exactly when the underlying
//! value supports them.

pub mod buffer;
pub mod call;
pub mod convert;
pub mod error;
pub mod exception;
pub mod flags;
pub mod future;
pub mod proxy;
pub mod subtype;

pub use buffer::{BufferAccess, ElementFormat};
pub use call::OptionsSupport;
pub use convert::{guest_to_native, materialize, native_to_guest};
pub use error::BridgeError;
pub use exception::GuestException;
pub use flags::{classify, Capabilities};
pub use future::GuestFuture;
pub use proxy::{wrap, wrap_with_receiver, BoundNativeMethod, GuestProxy, IterOutcome, IterSource};
pub use subtype::{get_subtype, registry_stats, ProxyType, RegistryStats};
