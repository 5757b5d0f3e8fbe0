//! Buffer bridge: contiguous typed memory exposed through native views.
//!
//! A typed guest buffer is one-dimensional with a fixed element size and
//! format, both derived exactly once at proxy construction from the guest's
//! element-type tag. Where the bytes live decides the strategy:
//!
//! - **Direct**: the guest memory is addressable by the native runtime, so
//!   views point straight at it with no copy. The view borrows the proxy,
//!   which keeps the underlying value retained for the view's lifetime.
//! - **Copied**: every acquisition refreshes an owned allocation from the
//!   guest's current contents. Correctness over efficiency; writes land in
//!   the copy and are not pushed back.
//!
//! An unrecognized element tag is a fatal construction error: it means the
//! engine is missing support for a typed-value kind, not that the caller
//! did anything wrong.

use crate::error::BridgeError;
use std::cell::{RefCell, RefMut};
use tether_core::{GuestRef, GuestRuntime};

// =============================================================================
// Element Formats
// =============================================================================

/// Element type of a typed guest buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementFormat {
    U8,
    I8,
    U8Clamped,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ElementFormat {
    /// Parse a guest element-type tag.
    pub fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "u8" => ElementFormat::U8,
            "i8" => ElementFormat::I8,
            "u8c" => ElementFormat::U8Clamped,
            "u16" => ElementFormat::U16,
            "i16" => ElementFormat::I16,
            "u32" => ElementFormat::U32,
            "i32" => ElementFormat::I32,
            "u64" => ElementFormat::U64,
            "i64" => ElementFormat::I64,
            "f32" => ElementFormat::F32,
            "f64" => ElementFormat::F64,
            _ => return None,
        })
    }

    /// Size of one element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            ElementFormat::U8 | ElementFormat::I8 | ElementFormat::U8Clamped => 1,
            ElementFormat::U16 | ElementFormat::I16 => 2,
            ElementFormat::U32 | ElementFormat::I32 | ElementFormat::F32 => 4,
            ElementFormat::U64 | ElementFormat::I64 | ElementFormat::F64 => 8,
        }
    }

    /// Single-character format code in the native buffer convention.
    pub fn format_char(self) -> char {
        match self {
            ElementFormat::U8 | ElementFormat::U8Clamped => 'B',
            ElementFormat::I8 => 'b',
            ElementFormat::U16 => 'H',
            ElementFormat::I16 => 'h',
            ElementFormat::U32 => 'I',
            ElementFormat::I32 => 'i',
            ElementFormat::U64 => 'Q',
            ElementFormat::I64 => 'q',
            ElementFormat::F32 => 'f',
            ElementFormat::F64 => 'd',
        }
    }
}

// =============================================================================
// Backing
// =============================================================================

/// Where a buffer view's bytes come from.
enum Backing {
    /// Guest memory the native runtime can address. The pointer stays valid
    /// while the underlying value is retained, which the owning proxy
    /// guarantees for its own lifetime.
    Direct(*mut u8),
    /// Owned allocation refreshed from guest contents on each acquisition.
    Copied(RefCell<Box<[u8]>>),
}

/// Per-instance buffer metadata, fixed at proxy construction.
///
/// This is the extra storage the typed-buffer capability adds to the
/// instance layout.
pub struct BufferMeta {
    byte_length: usize,
    format: ElementFormat,
    backing: Backing,
}

impl BufferMeta {
    /// Derive buffer metadata from a typed guest value.
    ///
    /// Fails with an internal error on an unrecognized element tag, naming
    /// the guest constructor.
    pub(crate) fn from_guest(rt: &dyn GuestRuntime, r: GuestRef) -> Result<Self, BridgeError> {
        let tag = rt.element_format(r).unwrap_or_default();
        let format = ElementFormat::parse(&tag).ok_or_else(|| {
            BridgeError::internal(format!(
                "unknown typed buffer element type '{}'",
                rt.constructor_name(r)
            ))
        })?;
        let byte_length = rt.byte_length(r);

        let backing = if rt.is_directly_addressable(r) {
            match rt.direct_byte_ptr(r) {
                Some(ptr) => Backing::Direct(ptr),
                None => {
                    return Err(BridgeError::internal(
                        "guest reported addressable buffer without a base pointer",
                    ));
                }
            }
        } else {
            Backing::Copied(RefCell::new(vec![0u8; byte_length].into_boxed_slice()))
        };

        Ok(Self {
            byte_length,
            format,
            backing,
        })
    }

    /// Total length in bytes.
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Element format.
    #[inline]
    pub fn format(&self) -> ElementFormat {
        self.format
    }

    /// Whether this instance owns a copied backing allocation.
    #[inline]
    pub fn owns_backing(&self) -> bool {
        matches!(self.backing, Backing::Copied(_))
    }

    /// Acquire a view of the buffer.
    ///
    /// With a copied backing, this refreshes the owned allocation from the
    /// guest's current contents first.
    pub(crate) fn acquire<'a>(
        &'a self,
        rt: &dyn GuestRuntime,
        r: GuestRef,
    ) -> BufferAccess<'a> {
        match &self.backing {
            Backing::Direct(ptr) => BufferAccess {
                bytes: AccessBytes::Direct {
                    ptr: *ptr,
                    len: self.byte_length,
                },
                format: self.format,
            },
            Backing::Copied(cell) => {
                let mut bytes = cell.borrow_mut();
                rt.copy_bytes_to(r, &mut bytes);
                BufferAccess {
                    bytes: AccessBytes::Copied(bytes),
                    format: self.format,
                }
            }
        }
    }
}

// =============================================================================
// BufferAccess
// =============================================================================

enum AccessBytes<'a> {
    Direct { ptr: *mut u8, len: usize },
    Copied(RefMut<'a, Box<[u8]>>),
}

/// A read-write view of a typed guest buffer.
///
/// Borrows the proxy instance, so the underlying guest value stays retained
/// while the view is alive.
pub struct BufferAccess<'a> {
    bytes: AccessBytes<'a>,
    format: ElementFormat,
}

impl std::fmt::Debug for BufferAccess<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferAccess")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl BufferAccess<'_> {
    /// Element format of the view.
    #[inline]
    pub fn format(&self) -> ElementFormat {
        self.format
    }

    /// Size of one element in bytes.
    #[inline]
    pub fn item_size(&self) -> usize {
        self.format.item_size()
    }

    /// Length in bytes.
    pub fn byte_length(&self) -> usize {
        match &self.bytes {
            AccessBytes::Direct { len, .. } => *len,
            AccessBytes::Copied(b) => b.len(),
        }
    }

    /// Number of elements.
    pub fn element_count(&self) -> usize {
        self.byte_length() / self.format.item_size()
    }

    /// The bytes, read-only.
    pub fn as_slice(&self) -> &[u8] {
        match &self.bytes {
            AccessBytes::Direct { ptr, len } => unsafe {
                std::slice::from_raw_parts(*ptr, *len)
            },
            AccessBytes::Copied(b) => b,
        }
    }

    /// The bytes, writable. With a copied backing, writes stay in the copy.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match &mut self.bytes {
            AccessBytes::Direct { ptr, len } => unsafe {
                std::slice::from_raw_parts_mut(*ptr, *len)
            },
            AccessBytes::Copied(b) => b,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
