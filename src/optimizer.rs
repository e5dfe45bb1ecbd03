//! Bit-width optimizer.
//!
//! Once a column is fully appended its value range is known, and the vector
//! can be rewritten at the narrowest width that still holds every present
//! value. If nothing is missing the NA bitmap is dropped as well.
//!
//! | present values       | packing     |
//! |----------------------|-------------|
//! | `[0, 255]`           | 8-unsigned  |
//! | `[-128, 127]`        | 8-signed    |
//! | `[0, 65535]`         | 16-unsigned |
//! | `[-32768, 32767]`    | 16-signed   |
//! | `[0, 2^32-1]`        | 32-unsigned (64-bit columns only) |
//! | `i32` range          | 32-signed   |
//! | otherwise            | 64-signed   |
//!
//! Float columns keep their width; only the mask can go.

use tracing::debug;

use crate::buffer::{VectorKind, FRAME_LEN};
use crate::masked::{AppendableMaskedVector, MaskedVector};
use crate::primitive::{
    AppendablePrimitiveVector, BinaryVector, Packing, Primitive, PrimitiveVector, PrimitiveWriter,
};
use crate::Result;

/// The result of optimizing a vector: masked only if something is missing.
#[derive(Clone, Debug)]
pub enum OptimizedVector<T> {
    /// No element is missing.
    Primitive(PrimitiveVector<T>),
    /// At least one element is missing.
    Masked(MaskedVector<T>),
}

impl<T: Primitive> OptimizedVector<T> {
    /// Packing of the stored values.
    pub fn packing(&self) -> Packing {
        match self {
            OptimizedVector::Primitive(v) => v.packing(),
            OptimizedVector::Masked(v) => v.packing(),
        }
    }

    /// Whether the result still carries an NA bitmap.
    pub fn is_masked(&self) -> bool {
        matches!(self, OptimizedVector::Masked(_))
    }

    /// The encoded bytes, frame included.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OptimizedVector::Primitive(v) => v.as_bytes(),
            OptimizedVector::Masked(v) => v.as_bytes(),
        }
    }

    /// Size of the encoded vector in bytes.
    pub fn encoded_len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Consume the vector and return its encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OptimizedVector::Primitive(v) => v.into_bytes(),
            OptimizedVector::Masked(v) => v.into_bytes(),
        }
    }
}

impl<T: Primitive> BinaryVector<T> for OptimizedVector<T> {
    fn len(&self) -> usize {
        match self {
            OptimizedVector::Primitive(v) => v.len(),
            OptimizedVector::Masked(v) => v.len(),
        }
    }

    fn apply(&self, index: usize) -> T {
        match self {
            OptimizedVector::Primitive(v) => v.apply(index),
            OptimizedVector::Masked(v) => v.apply(index),
        }
    }

    fn is_available(&self, index: usize) -> bool {
        match self {
            OptimizedVector::Primitive(v) => v.is_available(index),
            OptimizedVector::Masked(v) => v.is_available(index),
        }
    }
}

/// Minimum and maximum over the present elements, or `None` if there are
/// none or the element type is not an integer.
pub fn available_range<T: Primitive, V: BinaryVector<T> + ?Sized>(vector: &V) -> Option<(i64, i64)> {
    vector
        .options()
        .flatten()
        .filter_map(|v| v.as_i64())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((min, max)) => Some((min.min(v), max.max(v))),
        })
}

fn choose_packing<T: Primitive>(range: Option<(i64, i64)>) -> Packing {
    if T::NATURAL.is_integer() {
        Packing::narrowest(range, T::NATURAL)
    } else {
        T::NATURAL
    }
}

/// Drop the bitmap of a vector with no missing values, sliding the inner
/// vector to the front of the same allocation.
fn strip_mask<T: Primitive>(vector: AppendableMaskedVector<T>) -> Result<PrimitiveVector<T>> {
    let (mut region, _, writer) = vector.into_parts();
    let inner_bytes = writer.end() - writer.start;
    region
        .as_mut_slice()
        .copy_within(writer.start..writer.end(), FRAME_LEN);
    region.truncate(FRAME_LEN + inner_bytes);
    region.set_kind(VectorKind::Primitive)?;
    let layout = PrimitiveWriter {
        start: FRAME_LEN,
        ..writer
    }
    .layout();
    Ok(PrimitiveVector::from_parts(region, layout))
}

/// Rewrite a finished masked vector in its smallest form.
///
/// - nothing missing: the mask is dropped; values are repacked only if a
///   narrower packing was chosen, otherwise the inner vector is reused.
/// - something missing, packing unchanged: the vector is frozen as is.
/// - something missing, packing narrower: values and mask are copied into a
///   new masked vector.
pub fn optimize<T: Primitive>(vector: AppendableMaskedVector<T>) -> Result<OptimizedVector<T>> {
    let len = vector.len();
    let na = vector.na_count();
    let from = vector.packing();
    let packing = choose_packing::<T>(available_range::<T, _>(&vector));
    debug!(len, na, %from, to = %packing, "optimize masked vector");

    if na == 0 {
        let stripped = strip_mask(vector)?;
        if packing == from {
            return Ok(OptimizedVector::Primitive(stripped));
        }
        let mut narrow = AppendablePrimitiveVector::with_packing(len, packing)?;
        narrow.add_vector(&stripped)?;
        return Ok(OptimizedVector::Primitive(narrow.freeze()));
    }

    if packing == from {
        return Ok(OptimizedVector::Masked(vector.freeze()));
    }
    let frozen = vector.freeze();
    let mut narrow = AppendableMaskedVector::with_packing(len, packing)?;
    narrow.add_vector(&frozen)?;
    Ok(OptimizedVector::Masked(narrow.freeze()))
}

/// Rewrite a finished unmasked vector at its narrowest packing.
pub fn optimize_primitive<T: Primitive>(vector: AppendablePrimitiveVector<T>) -> Result<PrimitiveVector<T>> {
    let from = vector.packing();
    let packing = choose_packing::<T>(available_range::<T, _>(&vector));
    debug!(len = vector.len(), %from, to = %packing, "optimize primitive vector");
    if packing == from {
        return Ok(vector.freeze());
    }
    let len = vector.len();
    let frozen = vector.freeze();
    let mut narrow = AppendablePrimitiveVector::with_packing(len, packing)?;
    narrow.add_vector(&frozen)?;
    Ok(narrow.freeze())
}
