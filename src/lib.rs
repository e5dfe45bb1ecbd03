//! # binvec
//!
//! Compact, self-describing binary vectors for column-oriented storage.
//!
//! ## Overview
//!
//! A column is built by appending values one at a time into a pre-sized
//! appendable vector, then frozen into an immutable vector that any reader
//! can open from its header bytes alone, without copying the payload.
//!
//! 1. **Variable bit-width packing**: integers are stored at 8, 16, 32 or 64
//!    bits, signed or unsigned, as recorded in a 3-byte header
//! 2. **NA bitmaps**: missing values are tracked in a word-aligned bitmap
//!    that is dropped entirely when nothing is missing
//! 3. **Optimization**: once a column is complete, the narrowest packing
//!    that still holds every present value is chosen
//! 4. **Alternate encodings**: delta encoding for integers and dictionary
//!    encoding for strings, kept only when they are strictly smaller
//!
//! ## Quick Start
//!
//! ```rust
//! use binvec::{BinaryVector, ColumnCodec, Packing, VectorKind};
//!
//! let codec = ColumnCodec::new();
//!
//! // Encode a column with missing values
//! let values = vec![Some(1i32), None, Some(300), None, Some(-5)];
//! let bytes = codec.encode_numeric(&values).unwrap();
//!
//! // Headers describe the layout
//! let meta = codec.metadata(&bytes).unwrap();
//! assert_eq!(meta.kind, VectorKind::Masked);
//! assert_eq!(meta.packing, Some(Packing::I16));
//!
//! // Read back without copying
//! let column = codec.decode_numeric::<i32>(&bytes).unwrap();
//! assert_eq!(column.options().collect::<Vec<_>>(), values);
//! ```
//!
//! ## Building vectors directly
//!
//! ```rust
//! use binvec::{optimize, AppendableMaskedVector, BinaryVector, Packing};
//!
//! let mut vector = AppendableMaskedVector::<i64>::new(4);
//! for v in [Some(-3), Some(100), Some(7), Some(0)] {
//!     vector.add_option(v).unwrap();
//! }
//!
//! // Nothing is missing, so the mask goes; every value fits in 8 bits
//! let optimized = optimize(vector).unwrap();
//! assert!(!optimized.is_masked());
//! assert_eq!(optimized.packing(), Packing::I8);
//! assert_eq!(optimized.apply(1), 100);
//! ```
//!
//! ## Wire Format
//!
//! Every top-level buffer starts with a 4-byte frame, followed by the body:
//!
//! | Field | Size | Values |
//! |-------|------|--------|
//! | magic | 2 | `0xB17C` |
//! | kind | 1 | 1 primitive, 2 masked, 3 delta, 4 bits, 5 utf8, 6 dictionary |
//! | element | 1 | 1 int32, 2 int64, 3 float32, 4 float64, 5 bool, 6 utf8 |
//!
//! All multi-byte integers are little-endian. Each module documents the
//! body it reads and writes.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod bitmap;
mod bits;
mod buffer;
mod column;
mod delta;
mod dictionary;
mod error;
mod masked;
mod optimizer;
mod primitive;
mod utf8;

pub use bitmap::{num_bytes_required, BitmapMask};
pub use bits::{AppendableBoolVector, BoolVector};
pub use buffer::{read_u16, read_u32, read_u64, ElementType, Frame, Region, VectorKind, FRAME_LEN, MAGIC};
pub use column::{Column, ColumnCodec, EncodingHint, NumericColumn, StringColumn, VectorMetadata};
pub use delta::DeltaVector;
pub use dictionary::DictionaryVector;
pub use error::VectorError;
pub use masked::{AppendableMaskedVector, MaskedVector};
pub use optimizer::{available_range, optimize, optimize_primitive, OptimizedVector};
pub use primitive::{
    AppendablePrimitiveVector, BinaryVector, BitWidth, Options, Packing, Primitive, PrimitiveVector, Variant,
    PRIMITIVE_HEADER_LEN,
};
pub use utf8::{AppendableUtf8Vector, Utf8Vector};

/// Convenience type alias for Results with VectorError.
pub type Result<T> = std::result::Result<T, VectorError>;
