//! Core types shared by the tether bridge.
//!
//! This crate provides:
//! - The native `Value` representation (reference-counted, attribute-based)
//! - The `NativeObject` protocol for heap objects surfaced as values
//! - The `GuestRuntime` interface consumed by the proxy engine
//! - Owned guest references (`Handle`) with destructor-driven release

pub mod guest;
pub mod value;

pub use guest::{CompareOp, GuestRef, GuestRuntime, Handle, IterStep, Scalar};
pub use value::{NativeObject, SliceRange, Value};
