//! Error types for binary vector encoding, decoding and construction.

use thiserror::Error;

use crate::buffer::ElementType;

/// Errors that can occur while building, freezing or decoding vectors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorError {
    /// An append would go past the capacity declared at construction.
    #[error("capacity exceeded: requested {requested}, only {available} remaining")]
    CapacityExceeded {
        /// Elements (or string bytes) the caller tried to append.
        requested: usize,
        /// Elements (or string bytes) still free in the vector.
        available: usize,
    },

    /// A raw read or write fell outside the region.
    #[error("out of bounds: {width} bytes at offset {offset} exceed region of {len} bytes")]
    OutOfBounds {
        /// Byte offset of the access.
        offset: usize,
        /// Width of the access in bytes.
        width: usize,
        /// Length of the region in bytes.
        len: usize,
    },

    /// A value does not fit the representation chosen for it.
    #[error("representation overflow: {0}")]
    Overflow(String),

    /// The buffer does not start with the frame magic marker.
    #[error("bad magic marker {found:#06x}")]
    BadMagic {
        /// The two bytes found where the magic should be.
        found: u16,
    },

    /// The buffer holds a different element type than the one requested.
    #[error("element type mismatch: expected {expected:?}, found {found:?}")]
    ElementMismatch {
        /// Element type the caller asked for.
        expected: ElementType,
        /// Element type recorded in the frame.
        found: ElementType,
    },

    /// The header declares a bit width outside 8/16/32/64.
    #[error("unsupported bit width {0}")]
    UnsupportedWidth(u16),

    /// The encoded data is corrupted or inconsistent.
    #[error("invalid encoded data: {0}")]
    InvalidData(String),
}
