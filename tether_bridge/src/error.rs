//! Bridge error type.
//!
//! Every failure the engine can produce maps onto one of these variants:
//! unsupported operations surface as `TypeError` or `NotImplementedError`,
//! missing members as `AttributeError`/`KeyError`/`IndexError`, guest-side
//! exceptions as `Foreign` (carrying the original error's proxy), engine
//! gaps as `InternalError`, and call-depth exhaustion as `RecursionError`.
//! Nothing downgrades: errors propagate to the caller unchanged.

use crate::exception::GuestException;
use std::fmt;

// =============================================================================
// BridgeError
// =============================================================================

/// An error raised by the proxy engine.
#[derive(Clone)]
pub enum BridgeError {
    /// Operation unsupported for the value (wrong kind, bad argument).
    TypeError(String),
    /// Named attribute not found, carrying the requested name.
    AttributeError(String),
    /// Subscript key not found, carrying the requested key.
    KeyError(String),
    /// Integer subscript out of range.
    IndexError(String),
    /// Operation recognized but deliberately unimplemented.
    NotImplementedError(String),
    /// Call depth limit exceeded.
    RecursionError(String),
    /// Engine gap (e.g. unrecognized buffer element format).
    InternalError(String),
    /// Exception raised on the guest side, original value attached.
    Foreign(GuestException),
}

impl BridgeError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        BridgeError::TypeError(msg.into())
    }

    pub fn attribute_error(name: impl Into<String>) -> Self {
        BridgeError::AttributeError(name.into())
    }

    pub fn key_error(key: impl Into<String>) -> Self {
        BridgeError::KeyError(key.into())
    }

    pub fn index_error(msg: impl Into<String>) -> Self {
        BridgeError::IndexError(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        BridgeError::NotImplementedError(msg.into())
    }

    pub fn recursion(msg: impl Into<String>) -> Self {
        BridgeError::RecursionError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        BridgeError::InternalError(msg.into())
    }

    pub fn foreign(exc: GuestException) -> Self {
        BridgeError::Foreign(exc)
    }

    /// The error's kind name, as it appears in rendered messages.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::TypeError(_) => "TypeError",
            BridgeError::AttributeError(_) => "AttributeError",
            BridgeError::KeyError(_) => "KeyError",
            BridgeError::IndexError(_) => "IndexError",
            BridgeError::NotImplementedError(_) => "NotImplementedError",
            BridgeError::RecursionError(_) => "RecursionError",
            BridgeError::InternalError(_) => "InternalError",
            BridgeError::Foreign(_) => "GuestError",
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::TypeError(msg)
            | BridgeError::IndexError(msg)
            | BridgeError::NotImplementedError(msg)
            | BridgeError::RecursionError(msg)
            | BridgeError::InternalError(msg) => write!(f, "{}: {}", self.kind(), msg),
            BridgeError::AttributeError(name) => write!(f, "AttributeError: {}", name),
            BridgeError::KeyError(key) => write!(f, "KeyError: {}", key),
            BridgeError::Foreign(exc) => write!(f, "GuestError: {}", exc.message()),
        }
    }
}

impl fmt::Debug for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for BridgeError {}

// =============================================================================
// Tests
// =============================================================================
